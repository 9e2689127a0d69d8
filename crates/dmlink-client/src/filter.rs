//! Energy-filter control through whichever script API the host provides.
//!
//! Three generations of filter scripting exist (`AF*`, `IFC*`, `IF*`) plus a
//! standalone zero-loss alignment. [`EnergyFilter::detect`] asks the host which
//! functions exist and keeps, for each operation, the last supported entry of
//! [`FILTER_FUNCTIONS`].

use std::collections::HashMap;

use crate::client::Client;
use crate::error::ClientError;

/// Returned by getters and setters the host cannot serve.
pub const FILTER_UNSUPPORTED: f64 = -1.0;

/// Returned by [`EnergyFilter::energy_offset`] when the host cannot read it.
pub const OFFSET_UNSUPPORTED: f64 = 0.0;

const WAIT_FOR_FILTER: &str = "IFWaitForFilter();";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    GetSlitIn,
    SetSlitIn,
    GetSlitWidth,
    SetSlitWidth,
    AlignZeroLoss,
    GetEnergyOffset,
    SetEnergyOffset,
}

/// Script function → operation, in check order. Later entries win.
pub const FILTER_FUNCTIONS: [(&str, FilterOp); 17] = [
    ("AFGetSlitState", FilterOp::GetSlitIn),
    ("AFSetSlitState", FilterOp::SetSlitIn),
    ("AFGetSlitWidth", FilterOp::GetSlitWidth),
    ("AFSetSlitWidth", FilterOp::SetSlitWidth),
    ("AFDoAlignZeroLoss", FilterOp::AlignZeroLoss),
    ("IFCGetSlitState", FilterOp::GetSlitIn),
    ("IFCSetSlitState", FilterOp::SetSlitIn),
    ("IFCGetSlitWidth", FilterOp::GetSlitWidth),
    ("IFCSetSlitWidth", FilterOp::SetSlitWidth),
    ("IFCDoAlignZeroLoss", FilterOp::AlignZeroLoss),
    ("IFGetSlitIn", FilterOp::GetSlitIn),
    ("IFSetSlitIn", FilterOp::SetSlitIn),
    ("IFGetEnergyLoss", FilterOp::GetEnergyOffset),
    ("IFSetEnergyLoss", FilterOp::SetEnergyOffset),
    ("IFGetSlitWidth", FilterOp::GetSlitWidth),
    ("IFSetSlitWidth", FilterOp::SetSlitWidth),
    ("GT_CenterZLP", FilterOp::AlignZeroLoss),
];

/// The script functions this host offers for each filter operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnergyFilter {
    functions: HashMap<FilterOp, &'static str>,
    wait: &'static str,
}

impl EnergyFilter {
    /// Check every entry of [`FILTER_FUNCTIONS`] on the host.
    pub fn detect(client: &mut Client) -> Result<Self, ClientError> {
        let mut supported = Vec::new();
        for (name, _) in FILTER_FUNCTIONS {
            if client.supports_script_function(name)? {
                supported.push(name);
            }
        }
        Ok(Self::from_supported(&supported))
    }

    /// Resolve operations from an already known set of supported names.
    pub fn from_supported(supported: &[&str]) -> Self {
        let mut functions = HashMap::new();
        for (name, op) in FILTER_FUNCTIONS {
            if supported.contains(&name) {
                functions.insert(op, name);
            }
        }
        let wait = match functions.get(&FilterOp::SetSlitIn) {
            Some(&"IFSetSlitIn") => WAIT_FOR_FILTER,
            _ => "",
        };
        tracing::debug!(operations = functions.len(), "energy filter resolved");
        Self { functions, wait }
    }

    /// Script function serving `op`, if any.
    pub fn function(&self, op: FilterOp) -> Option<&'static str> {
        self.functions.get(&op).copied()
    }

    pub fn is_available(&self) -> bool {
        !self.functions.is_empty()
    }

    /// 1.0 if the slit is in, -1.0 if out or unsupported.
    pub fn filter_enabled(&self, client: &mut Client) -> Result<f64, ClientError> {
        let Some(func) = self.function(FilterOp::GetSlitIn) else {
            return Ok(FILTER_UNSUPPORTED);
        };
        client.execute_for_double(&format!(
            "if ( {func}() ) {{ Exit(1.0); }} else {{ Exit(-1.0); }}"
        ))
    }

    /// Returns the host's status, or -1 if unsupported.
    pub fn set_filter_enabled(&self, client: &mut Client, enabled: bool) -> Result<i64, ClientError> {
        let Some(func) = self.function(FilterOp::SetSlitIn) else {
            return Ok(FILTER_UNSUPPORTED as i64);
        };
        let state = i32::from(enabled);
        client.execute_for_status(&format!("{func}({state}); {}", self.wait))
    }

    /// Slit width in eV.
    pub fn slit_width(&self, client: &mut Client) -> Result<f64, ClientError> {
        let Some(func) = self.function(FilterOp::GetSlitWidth) else {
            return Ok(FILTER_UNSUPPORTED);
        };
        client.execute_for_double(&format!("Exit({func}())"))
    }

    pub fn set_slit_width(&self, client: &mut Client, width: f64) -> Result<i64, ClientError> {
        let Some(func) = self.function(FilterOp::SetSlitWidth) else {
            return Ok(FILTER_UNSUPPORTED as i64);
        };
        client.execute_for_status(&format!(
            "if ( {func}({width:.6}) ) {{ Exit(1.0); }} else {{ Exit(-1.0); }}"
        ))
    }

    /// Energy loss offset in eV, 0.0 if unsupported.
    pub fn energy_offset(&self, client: &mut Client) -> Result<f64, ClientError> {
        let Some(func) = self.function(FilterOp::GetEnergyOffset) else {
            return Ok(OFFSET_UNSUPPORTED);
        };
        client.execute_for_double(&format!("Exit({func}())"))
    }

    pub fn set_energy_offset(&self, client: &mut Client, offset: f64) -> Result<i64, ClientError> {
        let Some(func) = self.function(FilterOp::SetEnergyOffset) else {
            return Ok(FILTER_UNSUPPORTED as i64);
        };
        client.execute_for_status(&format!(
            "if ( {func}({offset:.6}) ) {{ Exit(1.0); }} else {{ Exit(-1.0); }}"
        ))
    }

    /// Center the zero-loss peak in the slit. 1.0 on success.
    pub fn align_zero_loss(&self, client: &mut Client) -> Result<f64, ClientError> {
        let Some(func) = self.function(FilterOp::AlignZeroLoss) else {
            return Ok(FILTER_UNSUPPORTED);
        };
        client.execute_for_double(&format!(
            " if ( {func}() ) {{ {} Exit(1.0); }} else {{ Exit(-1.0); }}",
            self.wait
        ))
    }
}
