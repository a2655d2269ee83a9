//! Local-oscillator injection for a superhet transceiver under test.
//!
//! The AWG stands in for the radio's LO chain: output A carries the mixer
//! injection frequency and output B the IF carrier, swapped on transmit when
//! the radio swaps its LOs.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{generator, LOAD_OHMS};
use crate::analysis::dbm_to_vpp;
use crate::error::AppResult;
use crate::instrument::SineWave;
use crate::session::InstrumentSession;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrxLoParams {
    pub operating_hz: f64,
    pub if_carrier_hz: f64,
    pub lo_level_dbm: f64,
    /// Upper sideband: injection above the operating frequency.
    pub usb: bool,
    /// Radio swaps its LOs on transmit.
    pub lo_swap: bool,
    /// Simulate transmit (push-to-talk asserted).
    pub ptt: bool,
}

impl Default for TrxLoParams {
    fn default() -> Self {
        Self {
            operating_hz: 7.2e6,
            if_carrier_hz: 12.288e6,
            lo_level_dbm: 10.0,
            usb: false,
            lo_swap: false,
            ptt: false,
        }
    }
}

/// Frequencies and level programmed on the AWG.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoPlan {
    pub injection_hz: f64,
    /// Channel 1
    pub output_a_hz: f64,
    /// Channel 2
    pub output_b_hz: f64,
    pub amplitude_vpp: f64,
}

pub fn plan_lo(params: &TrxLoParams) -> LoPlan {
    let injection_hz = if params.usb {
        params.operating_hz + params.if_carrier_hz
    } else {
        params.if_carrier_hz - params.operating_hz
    };
    let (output_a_hz, output_b_hz) = if params.ptt && params.lo_swap {
        (params.if_carrier_hz, injection_hz)
    } else {
        (injection_hz, params.if_carrier_hz)
    };
    LoPlan {
        injection_hz,
        output_a_hz,
        output_b_hz,
        amplitude_vpp: dbm_to_vpp(params.lo_level_dbm),
    }
}

/// Program both AWG channels per [`plan_lo`] and switch them on.
pub async fn run_trx_lo(awg: &InstrumentSession, params: &TrxLoParams) -> AppResult<LoPlan> {
    let generator = generator(awg)?;
    let plan = plan_lo(params);
    info!(
        injection_hz = plan.injection_hz,
        output_a_hz = plan.output_a_hz,
        output_b_hz = plan.output_b_hz,
        "Setting up LO injection"
    );

    generator.reset().await?;
    generator.set_output_load(1, LOAD_OHMS).await?;
    generator.set_output_load(2, LOAD_OHMS).await?;
    generator
        .sine(1, SineWave::new(plan.output_a_hz, plan.amplitude_vpp))
        .await?;
    generator
        .sine(2, SineWave::new(plan.output_b_hz, plan.amplitude_vpp))
        .await?;
    generator.output_on(1).await?;
    generator.output_on(2).await?;
    Ok(plan)
}
