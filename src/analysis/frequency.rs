//! Expected-frequency generators for harmonic and intermodulation screens.

use serde::Serialize;
use std::collections::BTreeMap;

/// Highest harmonic a screen may ask for.
pub const MAX_HARMONIC: u32 = 50;
/// Highest intermodulation order a screen may ask for.
pub const MAX_INTERMOD_ORDER: u32 = 51;

/// Harmonics 2 through `highest` of `fundamental_hz`, ascending.
///
/// Empty when `highest < 2`.
pub fn harmonic_series(fundamental_hz: f64, highest: u32) -> Vec<f64> {
    (2..=highest).map(|n| fundamental_hz * f64::from(n)).collect()
}

/// Odd-order two-tone products, keyed by order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntermodProducts {
    /// order -> (product below f1, product above f2)
    pub by_order: BTreeMap<u32, (f64, f64)>,
    /// Every product frequency, in ascending order of order, low before high.
    pub all: Vec<f64>,
}

impl IntermodProducts {
    pub fn orders(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_order.keys().copied()
    }

    pub fn get(&self, order: u32) -> Option<(f64, f64)> {
        self.by_order.get(&order).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_order.is_empty()
    }
}

/// Third- and higher odd-order products of tones `f1` and `f2`.
///
/// For `i` in `1..=max_order/2`, order `k = 2i+1` has products
/// `(i+1)f1 - i f2` and `(i+1)f2 - i f1`. Empty when `max_order < 3`.
pub fn two_tone_products(f1_hz: f64, f2_hz: f64, max_order: u32) -> IntermodProducts {
    let mut products = IntermodProducts::default();
    if max_order < 3 {
        return products;
    }
    for i in 1..=max_order / 2 {
        let n = f64::from(i);
        let low = (n + 1.0) * f1_hz - n * f2_hz;
        let high = (n + 1.0) * f2_hz - n * f1_hz;
        products.by_order.insert(2 * i + 1, (low, high));
        products.all.push(low);
        products.all.push(high);
    }
    products
}
