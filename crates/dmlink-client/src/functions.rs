//! Fixed-shape plugin functions: versions, camera selection, read mode and
//! K2 frame saving.
//!
//! Every response starts with a status long. These calls treat a non-zero
//! status as [`ClientError::Status`].

use std::path::Path;

use dmlink_core::wire::{pack_str, pack_strs};
use dmlink_core::{FunctionCode, Message, MessageShape};

use crate::client::Client;
use crate::error::ClientError;

const STATUS_ONLY: MessageShape = MessageShape::new(1, 0, 0);
const STATUS_AND_LONG: MessageShape = MessageShape::new(2, 0, 0);
const STATUS_AND_BOOL: MessageShape = MessageShape::new(1, 1, 0);

/// Settings for a K2 camera's next acquisitions.
#[derive(Debug, Clone, PartialEq)]
pub struct K2Parameters {
    pub read_mode: i64,
    pub scaling: f64,
    pub hardware_processing: i64,
    pub dose_fractionation: bool,
    /// Seconds per frame.
    pub frame_time: f64,
    pub align_frames: bool,
    pub save_frames: bool,
    /// Alignment filter name. Empty for none.
    pub filter: String,
}

impl Default for K2Parameters {
    fn default() -> Self {
        Self {
            read_mode: 0,
            scaling: 1.0,
            hardware_processing: 0,
            dose_fractionation: false,
            frame_time: 0.025,
            align_frames: false,
            save_frames: false,
            filter: String::new(),
        }
    }
}

/// Where and how saved frames are written.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSaving {
    pub rotation_flip: i64,
    pub file_per_image: bool,
    pub directory: String,
    pub root_name: String,
    pub pixel_size: f64,
    /// Return before frames are written to disk.
    pub early_return: bool,
    pub lzw: bool,
    /// Frames to wait for before returning early.
    pub early_return_frame_count: i64,
    pub early_return_ram_grabs: i64,
}

impl FileSaving {
    pub fn new(directory: impl AsRef<Path>, root_name: impl Into<String>) -> Self {
        Self {
            rotation_flip: 0,
            file_per_image: true,
            directory: directory.as_ref().display().to_string(),
            root_name: root_name.into(),
            pixel_size: 1.0,
            early_return: false,
            lzw: false,
            early_return_frame_count: 0,
            early_return_ram_grabs: 0,
        }
    }

    /// Flag word of the extended request.
    pub fn flags(&self) -> i64 {
        128 * i64::from(self.early_return) + 8 * i64::from(self.lzw)
    }

    /// RAM grabs in the high 16 bits, frame count in the low, sent as a double.
    pub fn grab_sum(&self) -> f64 {
        ((self.early_return_ram_grabs << 16) + self.early_return_frame_count) as f64
    }
}

impl Client {
    /// Run a function whose response is `[status, value]`.
    fn get_long(&mut self, function: FunctionCode) -> Result<i64, ClientError> {
        let response = self.call_checked(function, &Message::call(function), STATUS_AND_LONG)?;
        Ok(response.long(1).unwrap_or_default())
    }

    /// Version of DigitalMicrograph on the host, e.g. `40300`.
    pub fn dm_version(&mut self) -> Result<i64, ClientError> {
        self.get_long(FunctionCode::GetDMVersion)
    }

    pub fn number_of_cameras(&mut self) -> Result<i64, ClientError> {
        self.get_long(FunctionCode::GetNumberOfCameras)
    }

    pub fn plugin_version(&mut self) -> Result<i64, ClientError> {
        self.get_long(FunctionCode::GetPluginVersion)
    }

    pub fn is_camera_inserted(&mut self, camera: i64) -> Result<bool, ClientError> {
        let function = FunctionCode::IsCameraInserted;
        let request = Message::call(function).longs([camera]);
        let response = self.call_checked(function, &request, STATUS_AND_BOOL)?;
        Ok(response.bool(0).unwrap_or_default())
    }

    pub fn insert_camera(&mut self, camera: i64, inserted: bool) -> Result<(), ClientError> {
        let function = FunctionCode::InsertCamera;
        let request = Message::call(function).longs([camera]).bools([inserted]);
        self.call_checked(function, &request, STATUS_ONLY)?;
        Ok(())
    }

    pub fn select_camera(&mut self, camera: i64) -> Result<(), ClientError> {
        let function = FunctionCode::SelectCamera;
        self.call_checked(function, &Message::call(function).longs([camera]), STATUS_ONLY)?;
        Ok(())
    }

    pub fn set_read_mode(&mut self, mode: i64, scaling: f64) -> Result<(), ClientError> {
        let function = FunctionCode::SetReadMode;
        let request = Message::call(function).longs([mode]).doubles([scaling]);
        self.call_checked(function, &request, STATUS_ONLY)?;
        Ok(())
    }

    pub fn set_shutter_normally_closed(&mut self, camera: i64, shutter: i64) -> Result<(), ClientError> {
        let function = FunctionCode::SetShutterNormallyClosed;
        let request = Message::call(function).longs([camera, shutter]);
        self.call_checked(function, &request, STATUS_ONLY)?;
        Ok(())
    }

    pub fn set_k2_parameters(&mut self, params: &K2Parameters) -> Result<(), ClientError> {
        let function = FunctionCode::SetK2Parameters;
        let request = Message::call(function)
            .longs([params.read_mode, params.hardware_processing])
            .bools([params.dose_fractionation, params.align_frames, params.save_frames])
            .doubles([params.scaling, params.frame_time])
            .trailing(pack_str(&params.filter, self.layout()));
        self.call_checked(function, &request, STATUS_ONLY)?;
        self.save_frames = params.save_frames;
        Ok(())
    }

    /// Configure frame saving. Uses the extended request when frames are
    /// being saved with early return or LZW compression.
    pub fn setup_file_saving(&mut self, saving: &FileSaving) -> Result<i64, ClientError> {
        let names = pack_strs(&[saving.directory.as_str(), saving.root_name.as_str()], self.layout());
        let extended = self.save_frames && (saving.early_return || saving.lzw);
        let (function, request) = if extended {
            let function = FunctionCode::SetupFileSaving2;
            let request = Message::call(function)
                .longs([saving.rotation_flip, saving.flags()])
                .bools([saving.file_per_image])
                .doubles([saving.pixel_size, saving.grab_sum(), 0.0, 0.0, 0.0])
                .trailing(names);
            (function, request)
        } else {
            let function = FunctionCode::SetupFileSaving;
            let request = Message::call(function)
                .longs([saving.rotation_flip])
                .bools([saving.file_per_image])
                .doubles([saving.pixel_size])
                .trailing(names);
            (function, request)
        };
        let response = self.call_checked(function, &request, STATUS_AND_LONG)?;
        Ok(response.long(1).unwrap_or_default())
    }
}
