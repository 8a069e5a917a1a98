// src/math.rs
//! Native functions behind the `Math` module.
//!
//! Every function has a `float` and a `double` overload. `abs`, `min`,
//! `max`, `sqrt`, `floor`, `ceil`, `range` and `map` are expanded inline by
//! the compiler and never reach this table.

use crate::native_registry::{NativeModule, NativeSignature, NativeType, NativeValue};

macro_rules! unary_pair {
    ($m:ident, $name:literal, $f32:ident, $f64:ident) => {
        $m.register(
            $name,
            $f32 as *const u8,
            NativeSignature::new([NativeType::Float], NativeType::Float),
        );
        $m.register(
            $name,
            $f64 as *const u8,
            NativeSignature::new([NativeType::Double], NativeType::Double),
        );
    };
}

macro_rules! binary_pair {
    ($m:ident, $name:literal, $f32:ident, $f64:ident) => {
        $m.register(
            $name,
            $f32 as *const u8,
            NativeSignature::new([NativeType::Float, NativeType::Float], NativeType::Float),
        );
        $m.register(
            $name,
            $f64 as *const u8,
            NativeSignature::new(
                [NativeType::Double, NativeType::Double],
                NativeType::Double,
            ),
        );
    };
}

/// Create the `Math` native module
pub fn module() -> NativeModule {
    let mut m = NativeModule::new();

    // Trigonometric and hyperbolic
    unary_pair!(m, "sin", snex_sinf, snex_sin);
    unary_pair!(m, "cos", snex_cosf, snex_cos);
    unary_pair!(m, "tan", snex_tanf, snex_tan);
    unary_pair!(m, "atan", snex_atanf, snex_atan);
    unary_pair!(m, "sinh", snex_sinhf, snex_sinh);
    unary_pair!(m, "cosh", snex_coshf, snex_cosh);
    unary_pair!(m, "tanh", snex_tanhf, snex_tanh);

    // Exponential and logarithmic
    unary_pair!(m, "exp", snex_expf, snex_exp);
    unary_pair!(m, "log", snex_logf, snex_log);
    unary_pair!(m, "log10", snex_log10f, snex_log10);
    binary_pair!(m, "pow", snex_powf, snex_pow);
    binary_pair!(m, "fmod", snex_fmodf, snex_fmod);

    // Audio helpers
    unary_pair!(m, "db2gain", snex_db2gainf, snex_db2gain);
    unary_pair!(m, "gain2db", snex_gain2dbf, snex_gain2db);
    unary_pair!(m, "sign", snex_signf, snex_sign);

    m.register_constant("PI", NativeValue::Double(std::f64::consts::PI));
    m.register_constant("E", NativeValue::Double(std::f64::consts::E));
    m.register_constant("SQRT2", NativeValue::Double(std::f64::consts::SQRT_2));

    m
}

/// Decibel floor used by the gain conversions.
pub const SILENCE_DB: f64 = -100.0;

// =============================================================================
// Trigonometric functions
// =============================================================================

pub extern "C" fn snex_sinf(x: f32) -> f32 {
    x.sin()
}

pub extern "C" fn snex_sin(x: f64) -> f64 {
    x.sin()
}

pub extern "C" fn snex_cosf(x: f32) -> f32 {
    x.cos()
}

pub extern "C" fn snex_cos(x: f64) -> f64 {
    x.cos()
}

pub extern "C" fn snex_tanf(x: f32) -> f32 {
    x.tan()
}

pub extern "C" fn snex_tan(x: f64) -> f64 {
    x.tan()
}

pub extern "C" fn snex_atanf(x: f32) -> f32 {
    x.atan()
}

pub extern "C" fn snex_atan(x: f64) -> f64 {
    x.atan()
}

pub extern "C" fn snex_sinhf(x: f32) -> f32 {
    x.sinh()
}

pub extern "C" fn snex_sinh(x: f64) -> f64 {
    x.sinh()
}

pub extern "C" fn snex_coshf(x: f32) -> f32 {
    x.cosh()
}

pub extern "C" fn snex_cosh(x: f64) -> f64 {
    x.cosh()
}

pub extern "C" fn snex_tanhf(x: f32) -> f32 {
    x.tanh()
}

pub extern "C" fn snex_tanh(x: f64) -> f64 {
    x.tanh()
}

// =============================================================================
// Exponential functions
// =============================================================================

pub extern "C" fn snex_expf(x: f32) -> f32 {
    x.exp()
}

pub extern "C" fn snex_exp(x: f64) -> f64 {
    x.exp()
}

pub extern "C" fn snex_logf(x: f32) -> f32 {
    x.ln()
}

pub extern "C" fn snex_log(x: f64) -> f64 {
    x.ln()
}

pub extern "C" fn snex_log10f(x: f32) -> f32 {
    x.log10()
}

pub extern "C" fn snex_log10(x: f64) -> f64 {
    x.log10()
}

pub extern "C" fn snex_powf(x: f32, y: f32) -> f32 {
    x.powf(y)
}

pub extern "C" fn snex_pow(x: f64, y: f64) -> f64 {
    x.powf(y)
}

/// Remainder with the sign of `x`, like C `fmod`.
pub extern "C" fn snex_fmodf(x: f32, y: f32) -> f32 {
    x % y
}

pub extern "C" fn snex_fmod(x: f64, y: f64) -> f64 {
    x % y
}

// =============================================================================
// Audio helpers
// =============================================================================

pub extern "C" fn snex_db2gainf(db: f32) -> f32 {
    snex_db2gain(db as f64) as f32
}

/// Decibels to linear gain. Anything at or below the floor is silence.
pub extern "C" fn snex_db2gain(db: f64) -> f64 {
    if db > SILENCE_DB {
        10f64.powf(db * 0.05)
    } else {
        0.0
    }
}

pub extern "C" fn snex_gain2dbf(gain: f32) -> f32 {
    snex_gain2db(gain as f64) as f32
}

pub extern "C" fn snex_gain2db(gain: f64) -> f64 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(SILENCE_DB)
    } else {
        SILENCE_DB
    }
}

/// -1, 0 or 1.
pub extern "C" fn snex_signf(x: f32) -> f32 {
    snex_sign(x as f64) as f32
}

pub extern "C" fn snex_sign(x: f64) -> f64 {
    ((0.0 < x) as i32 - (x < 0.0) as i32) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_conversions_clamp_at_silence() {
        assert_eq!(snex_db2gain(-120.0), 0.0);
        assert!((snex_db2gain(0.0) - 1.0).abs() < 1e-12);
        assert!((snex_db2gain(-6.0) - 0.501_187).abs() < 1e-5);
        assert_eq!(snex_gain2db(0.0), SILENCE_DB);
        assert!((snex_gain2db(1.0)).abs() < 1e-12);
    }

    #[test]
    fn sign_of_zero_is_zero() {
        assert_eq!(snex_sign(-3.0), -1.0);
        assert_eq!(snex_sign(0.0), 0.0);
        assert_eq!(snex_signf(2.5), 1.0);
    }

    #[test]
    fn module_has_float_and_double_overloads() {
        let m = module();
        for name in ["sin", "pow", "db2gain", "tanh"] {
            let overloads = m.overloads(name);
            assert_eq!(overloads.len(), 2, "{name}");
            assert_eq!(overloads[0].signature.return_type, NativeType::Float);
            assert_eq!(overloads[1].signature.return_type, NativeType::Double);
        }
        assert!(m.get("abs").is_none());
        assert!(matches!(m.constant("PI"), Some(NativeValue::Double(_))));
    }
}
