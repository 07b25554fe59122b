//! Logit-space numeric primitives shared by the risk engine, quoter, and
//! ladder builder. Every price the engine reasons about internally is
//! carried in logit space; these are the only two functions that cross
//! back and forth to probability space.

/// Clip `x` to `[lo, hi]`.
#[inline]
pub fn clip(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// `ln(p / (1 - p))`, with `p` clamped to `[eps, 1 - eps]` first so the
/// transform never blows up at the probability boundaries.
#[inline]
pub fn logit(p: f64, eps: f64) -> f64 {
    let p = clip(p, eps, 1.0 - eps);
    (p / (1.0 - p)).ln()
}

/// `logit` with the engine's default epsilon (1e-6).
#[inline]
pub fn logit_default(p: f64) -> f64 {
    logit(p, 1e-6)
}

/// Numerically stable sigmoid, branching on the sign of `x` so `exp`
/// never sees a large positive argument.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// Round a price down to the nearest tick.
#[inline]
pub fn floor_to_tick(p: f64, tick: f64) -> f64 {
    (p / tick).floor() * tick
}

/// Round a price up to the nearest tick.
#[inline]
pub fn ceil_to_tick(p: f64, tick: f64) -> f64 {
    (p / tick).ceil() * tick
}
