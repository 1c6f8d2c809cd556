//! Serialized camera operations
//!
//! Every method takes the MTP lock for the full round-trip, including the
//! composite end-LV / set-property / start-LV sequence behind an f-number
//! change. In dummy mode each wrapper short-circuits with canned values so
//! every control path stays exercisable without hardware.

use std::sync::Arc;

use crate::device::{
    DeviceError, MtpDevice, DPC_EXPOSURE_INDEX, DPC_FNUMBER, DPC_NIKON_LIVE_VIEW_PROHIBIT_CONDITION,
    DPC_NIKON_LIVE_VIEW_STATUS, DPC_NIKON_RECORDING_MEDIA, DPC_NIKON_RESOLUTION,
    OC_NIKON_AF_DRIVE, OC_NIKON_DEVICE_READY, OC_NIKON_END_LIVE_VIEW, OC_NIKON_GET_LIVE_VIEW_IMG,
    OC_NIKON_START_LIVE_VIEW, RECORDING_MEDIA_CARD, RECORDING_MEDIA_SDRAM,
};
use crate::camera_models::ResolutionWidth;
use crate::error::{Error, Result};
use crate::liveview::frame::{self, LiveViewFrame};
use crate::liveview::LvServer;

impl LvServer {
    fn device(&self) -> Result<&Arc<dyn MtpDevice>> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::Internal("no device attached".to_string()))
    }

    /// Enter live view, working through the model quirks on the way.
    pub(crate) async fn start_live_view(&self) -> Result<()> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok(());
        }
        let dev = self.device()?.clone();

        if dev
            .run_transaction_no_data(OC_NIKON_DEVICE_READY)
            .await
            .is_err()
        {
            return Err(Error::CameraNotReady);
        }

        if self.model.quirk_switch_media {
            self.switch_record_media(dev.as_ref()).await?;
        }

        if self.max_resolution {
            if let Err(e) = self.change_resolution(dev.as_ref()).await {
                tracing::warn!(
                    error = %e,
                    "failed to change the image resolution; if it affects capturing frames, consider disabling --max-resolution"
                );
            }
        }

        match dev.run_transaction_no_data(OC_NIKON_START_LIVE_VIEW).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_invalid_status() => {
                tracing::error!(
                    "failed to start live view (InvalidStatus), investigating the reason"
                );
                let reason = self.read_prohibit_condition(dev.as_ref()).await?;
                Err(Error::LiveViewProhibited(reason))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// End live view. Dummy mode is a no-op.
    pub(crate) async fn end_live_view(&self) -> Result<()> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok(());
        }
        self.device()?
            .run_transaction_no_data(OC_NIKON_END_LIVE_VIEW)
            .await?;
        Ok(())
    }

    /// Whether live view is currently active.
    ///
    /// The status property answers with an empty payload (or end-of-data)
    /// exactly when live view is on; a non-empty read means off.
    pub(crate) async fn live_view_status(&self) -> Result<bool> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok(true);
        }
        match self
            .device()?
            .get_prop_value(DPC_NIKON_LIVE_VIEW_STATUS)
            .await
        {
            Ok(value) => Ok(value.is_empty()),
            Err(DeviceError::EndOfData) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Drive the autofocus motor once.
    pub(crate) async fn auto_focus(&self) -> Result<()> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok(());
        }
        self.device()?
            .run_transaction_no_data(OC_NIKON_AF_DRIVE)
            .await?;
        Ok(())
    }

    /// Pull one live-view reply and decode it.
    pub(crate) async fn capture_live_view_img(&self) -> Result<LiveViewFrame> {
        let raw = {
            let _mtp = self.mtp_lock.lock().await;

            if self.dummy {
                return Ok(LiveViewFrame::default());
            }
            match self
                .device()?
                .run_transaction_data_in(OC_NIKON_GET_LIVE_VIEW_IMG, &[])
                .await
            {
                Ok(raw) => raw,
                Err(e) if e.is_not_live_view() => return Err(Error::NotLiveView),
                Err(e) => return Err(e.into()),
            }
        };

        frame::decode_reply(&raw, self.model.header_size)
    }

    /// Enumerated ISO choices and the current ISO.
    pub(crate) async fn iso_choices(&self) -> Result<(Vec<i32>, i32)> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok((vec![100, 1000, 10000], 100));
        }
        let desc = self.device()?.get_prop_desc(DPC_EXPOSURE_INDEX).await?;
        let choices = desc
            .enum_values()
            .map_err(|_| Error::PropForm("ExposureIndex is not an enum".to_string()))?
            .iter()
            .map(|&v| v as i32)
            .collect();
        Ok((choices, desc.current as i32))
    }

    /// Enumerated f-number choices and the current f-number, formatted as
    /// minimal decimal strings of `value / 100`.
    pub(crate) async fn fn_choices(&self) -> Result<(Vec<String>, String)> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok((
                vec!["3.5".to_string(), "10".to_string(), "22".to_string()],
                "3.5".to_string(),
            ));
        }
        let desc = self.device()?.get_prop_desc(DPC_FNUMBER).await?;
        let choices = desc
            .enum_values()
            .map_err(|_| Error::PropForm("FNumber is not an enum".to_string()))?
            .iter()
            .map(|&v| format_f_number(v))
            .collect();
        Ok((choices, format_f_number(desc.current)))
    }

    /// Write the ISO property.
    pub(crate) async fn set_iso(&self, iso: i32) -> Result<()> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok(());
        }
        self.device()?
            .set_prop_value(DPC_EXPOSURE_INDEX, &(iso as u16).to_le_bytes())
            .await?;
        Ok(())
    }

    /// Write the f-number property.
    ///
    /// The property cannot be set while live view is active on the target
    /// hardware, so this cycles live view around the write. A failed
    /// restart is not retried here.
    pub(crate) async fn set_fn(&self, fn_str: &str) -> Result<()> {
        let _mtp = self.mtp_lock.lock().await;

        if self.dummy {
            return Ok(());
        }
        let fnf: f64 = fn_str
            .parse()
            .map_err(|_| Error::Validation(format!("failed to parse f-number: {fn_str}")))?;
        let dev = self.device()?;

        dev.run_transaction_no_data(OC_NIKON_END_LIVE_VIEW).await?;

        let wire = (fnf * 100.0).round() as u16;
        dev.set_prop_value(DPC_FNUMBER, &wire.to_le_bytes()).await?;

        match dev.run_transaction_no_data(OC_NIKON_START_LIVE_VIEW).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_invalid_status() => Err(Error::LiveViewProhibited(
                "InvalidStatus (battery level is low?)".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Force the recording media to SDRAM when the camera still points at
    /// the card. Surprising current values are logged, not fatal.
    async fn switch_record_media(&self, dev: &dyn MtpDevice) -> Result<()> {
        let desc = dev.get_prop_desc(DPC_NIKON_RECORDING_MEDIA).await?;

        match desc.current {
            c if c == RECORDING_MEDIA_CARD as u64 => {
                tracing::debug!("recording media is the card, switching it to SDRAM");
                dev.set_prop_value(DPC_NIKON_RECORDING_MEDIA, &[RECORDING_MEDIA_SDRAM])
                    .await?;
            }
            c if c == RECORDING_MEDIA_SDRAM as u64 => {
                tracing::debug!("recording media is already SDRAM");
            }
            other => {
                tracing::warn!(value = other, "unexpected RecordingMedia value");
            }
        }
        Ok(())
    }

    /// Probe the resolution enumeration and select the largest choice,
    /// serialized at the model's width.
    async fn change_resolution(&self, dev: &dyn MtpDevice) -> Result<()> {
        tracing::info!("getting available resolutions");
        let desc = dev.get_prop_desc(DPC_NIKON_RESOLUTION).await?;
        let choices = desc
            .enum_values()
            .map_err(|_| Error::PropForm("Resolution is not an enum".to_string()))?;
        let largest = choices
            .iter()
            .copied()
            .max()
            .ok_or_else(|| Error::PropForm("empty resolution enumeration".to_string()))?;

        tracing::info!(?choices, largest, "selecting the largest resolution");

        match self.model.resolution_width {
            ResolutionWidth::U8 => {
                dev.set_prop_value(DPC_NIKON_RESOLUTION, &[largest as u8])
                    .await?
            }
            ResolutionWidth::U64 => {
                dev.set_prop_value(DPC_NIKON_RESOLUTION, &largest.to_le_bytes())
                    .await?
            }
        }
        Ok(())
    }

    /// Read the prohibit-condition bitmap and map it to a human reason.
    async fn read_prohibit_condition(&self, dev: &dyn MtpDevice) -> Result<String> {
        let raw = dev
            .get_prop_value(DPC_NIKON_LIVE_VIEW_PROHIBIT_CONDITION)
            .await?;
        if raw.len() < 4 {
            return Err(Error::PropForm(format!(
                "LiveViewProhibitCondition is {} bytes",
                raw.len()
            )));
        }
        let value = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok(prohibit_reason(value).to_string())
    }
}

fn format_f_number(raw: u64) -> String {
    (raw as f64 / 100.0).to_string()
}

/// Map the lowest set bit of the prohibit bitmap to a reason.
fn prohibit_reason(value: u32) -> &'static str {
    let bit = if value == 0 {
        return "(empty)";
    } else {
        value.trailing_zeros()
    };

    match bit {
        0 => "recording destination is the card",
        2 => "sequence error",
        4 => "button is fully pressed",
        5 => "aperture value is set by the lens",
        6 => "bulb error",
        7 => "during cleaning",
        8 => "insufficient battery",
        9 => "TTL error",
        11 => "non-CPU lens is mounted and the mode is not M",
        12 => "there are images which are recorded in SDRAM",
        13 => "the release mode is mirror-up",
        14 => "no card inserted",
        15 => "shot command is being processed",
        16 => "shooting in progress",
        17 => "overheated",
        18 => "card is protected",
        19 => "card error",
        20 => "card is not formatted",
        21 => "bulb error",
        22 => "the release mode is mirror-up and it is being processed",
        24 => "the lens is not extended",
        _ => "unknown reason",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{Call, MockDevice};
    use crate::device::{DevicePropDesc, PropForm};

    async fn server_with(dev: MockDevice) -> (Arc<MockDevice>, LvServer) {
        let dev = Arc::new(dev);
        let server = LvServer::new(Some(dev.clone() as Arc<dyn MtpDevice>), false)
            .await
            .unwrap();
        (dev, server)
    }

    fn mock_with_choice_descs() -> MockDevice {
        MockDevice::new()
            .with_prop_desc(
                DPC_EXPOSURE_INDEX,
                DevicePropDesc {
                    current: 400,
                    form: PropForm::Enum(vec![100, 200, 400, 800]),
                },
            )
            .with_prop_desc(
                DPC_FNUMBER,
                DevicePropDesc {
                    current: 560,
                    form: PropForm::Enum(vec![350, 560, 1000, 2200]),
                },
            )
            .with_prop_desc(
                DPC_NIKON_RECORDING_MEDIA,
                DevicePropDesc {
                    current: RECORDING_MEDIA_SDRAM as u64,
                    form: PropForm::None,
                },
            )
    }

    #[test]
    fn prohibit_reasons_follow_the_lowest_set_bit() {
        assert_eq!(prohibit_reason(0), "(empty)");
        assert_eq!(prohibit_reason(1 << 8), "insufficient battery");
        assert_eq!(prohibit_reason(1 << 14), "no card inserted");
        // Bit 8 wins over bit 14 when both are set.
        assert_eq!(prohibit_reason((1 << 8) | (1 << 14)), "insufficient battery");
        assert_eq!(prohibit_reason(1 << 10), "unknown reason");
    }

    #[test]
    fn f_numbers_format_with_minimal_decimals() {
        assert_eq!(format_f_number(560), "5.6");
        assert_eq!(format_f_number(1000), "10");
        assert_eq!(format_f_number(350), "3.5");
        assert_eq!(format_f_number(2200), "22");
    }

    #[tokio::test]
    async fn set_fn_cycles_live_view_in_order() {
        let (mock, server) = server_with(mock_with_choice_descs()).await;
        server.set_fn("5.6").await.unwrap();

        let calls: Vec<Call> = mock
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::GetDesc(_)))
            .collect();
        assert_eq!(
            calls,
            vec![
                Call::NoData(OC_NIKON_END_LIVE_VIEW),
                Call::SetValue(DPC_FNUMBER, 560u16.to_le_bytes().to_vec()),
                Call::NoData(OC_NIKON_START_LIVE_VIEW),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_status_on_start_surfaces_the_prohibit_reason() {
        let dev = mock_with_choice_descs()
            .with_no_data_result(
                OC_NIKON_START_LIVE_VIEW,
                Err(DeviceError::ResponseCode(
                    crate::device::RC_NIKON_INVALID_STATUS,
                )),
            )
            .with_prop_value(
                DPC_NIKON_LIVE_VIEW_PROHIBIT_CONDITION,
                Ok((1u32 << 14).to_le_bytes().to_vec()),
            );
        let (_mock, server) = server_with(dev).await;

        let err = server.start_live_view().await.unwrap_err();
        match err {
            Error::LiveViewProhibited(reason) => assert_eq!(reason, "no card inserted"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn live_view_status_reads_empty_as_active() {
        let dev = mock_with_choice_descs()
            .with_prop_value(DPC_NIKON_LIVE_VIEW_STATUS, Ok(Vec::new()));
        let (_mock, server) = server_with(dev).await;
        assert!(server.live_view_status().await.unwrap());

        let dev = mock_with_choice_descs()
            .with_prop_value(DPC_NIKON_LIVE_VIEW_STATUS, Ok(vec![0x01]));
        let (_mock, server) = server_with(dev).await;
        assert!(!server.live_view_status().await.unwrap());

        let dev = mock_with_choice_descs()
            .with_prop_value(DPC_NIKON_LIVE_VIEW_STATUS, Err(DeviceError::EndOfData));
        let (_mock, server) = server_with(dev).await;
        assert!(server.live_view_status().await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_wrappers_never_overlap_transactions() {
        let (mock, server) = server_with(mock_with_choice_descs()).await;
        let server = Arc::new(server);

        let mut handles = Vec::new();
        for i in 0..8 {
            let s = server.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let _ = s.auto_focus().await;
                } else {
                    let _ = s.iso_choices().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(!mock.saw_overlap(), "transactions overlapped");
    }

    #[tokio::test]
    async fn dummy_mode_serves_canned_choices() {
        let server = LvServer::new(None, false).await.unwrap();
        let (isos, current) = server.iso_choices().await.unwrap();
        assert_eq!(isos, vec![100, 1000, 10000]);
        assert_eq!(current, 100);
        let (fns, current) = server.fn_choices().await.unwrap();
        assert_eq!(fns, vec!["3.5", "10", "22"]);
        assert_eq!(current, "3.5");
        assert!(server.set_fn("5.6").await.is_ok());
    }
}
