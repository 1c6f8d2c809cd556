//! Camera model catalogue
//!
//! Per-model live-view quirks: the byte offset where the JPEG payload
//! starts in a live-view reply, whether the recording media must be
//! forced to SDRAM before live view, and the serialization width of the
//! resolution property.

/// Wire width of the resolution property value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionWidth {
    /// Serialized as a single byte
    U8,
    /// Serialized as eight bytes
    U64,
}

/// Model-specific live-view parameters
#[derive(Debug, Clone)]
pub struct Model {
    /// Marketing name, also the substring matched against the product id
    pub name: &'static str,
    /// Byte offset where the JPEG begins in a live-view reply
    pub header_size: usize,
    /// Force recording media to SDRAM before starting live view
    pub quirk_switch_media: bool,
    /// Serialization width for the resolution property
    pub resolution_width: ResolutionWidth,
}

const GENERIC: Model = Model {
    name: "Generic",
    header_size: 384,
    quirk_switch_media: false,
    resolution_width: ResolutionWidth::U8,
};

const CATALOGUE: &[Model] = &[
    Model {
        name: "D90",
        header_size: 128,
        quirk_switch_media: false,
        resolution_width: ResolutionWidth::U8,
    },
    Model {
        name: "D5000",
        header_size: 128,
        quirk_switch_media: true,
        resolution_width: ResolutionWidth::U64,
    },
    Model {
        name: "D3100",
        header_size: 128,
        quirk_switch_media: true,
        resolution_width: ResolutionWidth::U8,
    },
    Model {
        name: "D850",
        header_size: 384,
        quirk_switch_media: false,
        resolution_width: ResolutionWidth::U64,
    },
];

/// Resolve a model from the product string reported by the device.
pub fn match_product(product: &str) -> Option<Model> {
    CATALOGUE
        .iter()
        .find(|m| product.contains(m.name))
        .cloned()
}

/// The fallback model used when the product id is unknown.
pub fn generic() -> Model {
    GENERIC
}
