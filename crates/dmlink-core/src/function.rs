//! Function codes understood by the host plugin.
//!
//! The numeric value of each code IS the protocol. Codes start at 1 and follow
//! the declaration order of the plugin's function table; a code may never be
//! renumbered or reordered, only appended. The table is static, so it is
//! shared freely between connections.

use std::fmt;
use std::str::FromStr;

use static_assertions::const_assert_eq;

/// A remote operation, identified on the wire by its 1-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i64)]
pub enum FunctionCode {
    ExecuteScript = 1,
    SetDebugMode = 2,
    SetDMVersion = 3,
    SetCurrentCamera = 4,
    QueueScript = 5,
    GetAcquiredImage = 6,
    GetDarkReference = 7,
    GetGainReference = 8,
    SelectCamera = 9,
    SetReadMode = 10,
    GetNumberOfCameras = 11,
    IsCameraInserted = 12,
    InsertCamera = 13,
    GetDMVersion = 14,
    GetDMCapabilities = 15,
    SetShutterNormallyClosed = 16,
    SetNoDMSettling = 17,
    GetDSProperties = 18,
    AcquireDSImage = 19,
    ReturnDSChannel = 20,
    StopDSAcquisition = 21,
    CheckReferenceTime = 22,
    SetK2Parameters = 23,
    ChunkHandshake = 24,
    SetupFileSaving = 25,
    GetFileSaveResult = 26,
    SetupFileSaving2 = 27,
    GetDefectList = 28,
    SetK2Parameters2 = 29,
    StopContinuousCamera = 30,
    GetPluginVersion = 31,
    GetLastError = 32,
    FreeK2GainReference = 33,
}

impl FunctionCode {
    /// Every code, in wire order. `ALL[i].code() == i + 1`.
    pub const ALL: [FunctionCode; 33] = [
        FunctionCode::ExecuteScript,
        FunctionCode::SetDebugMode,
        FunctionCode::SetDMVersion,
        FunctionCode::SetCurrentCamera,
        FunctionCode::QueueScript,
        FunctionCode::GetAcquiredImage,
        FunctionCode::GetDarkReference,
        FunctionCode::GetGainReference,
        FunctionCode::SelectCamera,
        FunctionCode::SetReadMode,
        FunctionCode::GetNumberOfCameras,
        FunctionCode::IsCameraInserted,
        FunctionCode::InsertCamera,
        FunctionCode::GetDMVersion,
        FunctionCode::GetDMCapabilities,
        FunctionCode::SetShutterNormallyClosed,
        FunctionCode::SetNoDMSettling,
        FunctionCode::GetDSProperties,
        FunctionCode::AcquireDSImage,
        FunctionCode::ReturnDSChannel,
        FunctionCode::StopDSAcquisition,
        FunctionCode::CheckReferenceTime,
        FunctionCode::SetK2Parameters,
        FunctionCode::ChunkHandshake,
        FunctionCode::SetupFileSaving,
        FunctionCode::GetFileSaveResult,
        FunctionCode::SetupFileSaving2,
        FunctionCode::GetDefectList,
        FunctionCode::SetK2Parameters2,
        FunctionCode::StopContinuousCamera,
        FunctionCode::GetPluginVersion,
        FunctionCode::GetLastError,
        FunctionCode::FreeK2GainReference,
    ];

    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Name as used by the plugin, e.g. `GS_ExecuteScript`.
    pub const fn name(self) -> &'static str {
        match self {
            FunctionCode::ExecuteScript => "GS_ExecuteScript",
            FunctionCode::SetDebugMode => "GS_SetDebugMode",
            FunctionCode::SetDMVersion => "GS_SetDMVersion",
            FunctionCode::SetCurrentCamera => "GS_SetCurrentCamera",
            FunctionCode::QueueScript => "GS_QueueScript",
            FunctionCode::GetAcquiredImage => "GS_GetAcquiredImage",
            FunctionCode::GetDarkReference => "GS_GetDarkReference",
            FunctionCode::GetGainReference => "GS_GetGainReference",
            FunctionCode::SelectCamera => "GS_SelectCamera",
            FunctionCode::SetReadMode => "GS_SetReadMode",
            FunctionCode::GetNumberOfCameras => "GS_GetNumberOfCameras",
            FunctionCode::IsCameraInserted => "GS_IsCameraInserted",
            FunctionCode::InsertCamera => "GS_InsertCamera",
            FunctionCode::GetDMVersion => "GS_GetDMVersion",
            FunctionCode::GetDMCapabilities => "GS_GetDMCapabilities",
            FunctionCode::SetShutterNormallyClosed => "GS_SetShutterNormallyClosed",
            FunctionCode::SetNoDMSettling => "GS_SetNoDMSettling",
            FunctionCode::GetDSProperties => "GS_GetDSProperties",
            FunctionCode::AcquireDSImage => "GS_AcquireDSImage",
            FunctionCode::ReturnDSChannel => "GS_ReturnDSChannel",
            FunctionCode::StopDSAcquisition => "GS_StopDSAcquisition",
            FunctionCode::CheckReferenceTime => "GS_CheckReferenceTime",
            FunctionCode::SetK2Parameters => "GS_SetK2Parameters",
            FunctionCode::ChunkHandshake => "GS_ChunkHandshake",
            FunctionCode::SetupFileSaving => "GS_SetupFileSaving",
            FunctionCode::GetFileSaveResult => "GS_GetFileSaveResult",
            FunctionCode::SetupFileSaving2 => "GS_SetupFileSaving2",
            FunctionCode::GetDefectList => "GS_GetDefectList",
            FunctionCode::SetK2Parameters2 => "GS_SetK2Parameters2",
            FunctionCode::StopContinuousCamera => "GS_StopContinuousCamera",
            FunctionCode::GetPluginVersion => "GS_GetPluginVersion",
            FunctionCode::GetLastError => "GS_GetLastError",
            FunctionCode::FreeK2GainReference => "GS_FreeK2GainReference",
        }
    }

    pub fn from_code(code: i64) -> Result<Self, RegistryError> {
        usize::try_from(code)
            .ok()
            .and_then(|c| c.checked_sub(1))
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(RegistryError::UnknownCode(code))
    }
}

const_assert_eq!(FunctionCode::ALL.len(), FunctionCode::FreeK2GainReference as usize);

/// Look up a function by name. The `GS_` prefix is optional.
pub fn code_for(name: &str) -> Result<FunctionCode, RegistryError> {
    let bare = name.strip_prefix("GS_").unwrap_or(name);
    FunctionCode::ALL
        .iter()
        .copied()
        .find(|f| &f.name()[3..] == bare)
        .ok_or_else(|| RegistryError::UnknownFunction(name.to_string()))
}

impl FromStr for FunctionCode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        code_for(s)
    }
}

impl TryFrom<i64> for FunctionCode {
    type Error = RegistryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_code(value)
    }
}

impl From<FunctionCode> for i64 {
    fn from(f: FunctionCode) -> i64 {
        f.code()
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("unknown function code: {0}")]
    UnknownCode(i64),
}
