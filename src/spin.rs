//! Derived spin quantities used to label and bound catalog entries.
//!
//! Catalog metadata stores spin components with limited precision, so every
//! function rounds components to 3 decimal places before deriving anything;
//! the results must be bit-reproducible across runs.

use nalgebra::Vector3;

/// Decimal places retained from catalog spin metadata.
const METADATA_NDECIMALS: i32 = 3;

/// Unit orbital angular momentum axis of the source frame.
fn l_hat() -> Vector3<f64> {
    Vector3::new(0.0, 0.0, 1.0)
}

fn round_metadata(x: f64) -> f64 {
    let scale = 10_f64.powi(METADATA_NDECIMALS);
    (x * scale).round() / scale
}

/// Build a spin vector from raw components and return it together with its
/// magnitude. Components are rounded to metadata precision first.
pub fn spin_vector(sx: f64, sy: f64, sz: f64) -> (Vector3<f64>, f64) {
    let a = Vector3::new(round_metadata(sx), round_metadata(sy), round_metadata(sz));
    let norm = a.norm();
    (a, norm)
}

/// Dot and cross product of the mass-weighted effective spin with the
/// orbital angular momentum axis.
///
/// `S_eff = (1 + 1/q)·S₁ + (1 + q)·S₂` with `Sᵢ = aᵢ mᵢ²`,
/// `m₁ = q/(1+q)`, `m₂ = 1 − m₁`. Returns zeros when either spin or the
/// combination itself vanishes.
pub fn effective_spin_alignment(
    mass_ratio: f64,
    spin1: Vector3<f64>,
    spin2: Vector3<f64>,
) -> (f64, Vector3<f64>) {
    let mass1 = mass_ratio / (1.0 + mass_ratio);
    let mass2 = 1.0 - mass1;

    let (a1, a1_norm) = spin_vector(spin1.x, spin1.y, spin1.z);
    if a1_norm == 0.0 {
        return (0.0, Vector3::zeros());
    }
    let (a2, a2_norm) = spin_vector(spin2.x, spin2.y, spin2.z);
    if a2_norm == 0.0 {
        return (0.0, Vector3::zeros());
    }

    let s1 = a1 * mass1 * mass1;
    let s2 = a2 * mass2 * mass2;
    let s_eff = s1 * (1.0 + 1.0 / mass_ratio) + s2 * (1.0 + mass_ratio);

    if s_eff.norm() > 0.0 {
        (s_eff.dot(&l_hat()), s_eff.cross(&l_hat()))
    } else {
        (0.0, Vector3::zeros())
    }
}

/// Angle in degrees subtended by the two spin vectors.
///
/// The dot product of the unit spins is rounded to metadata precision
/// before the ±1 boundary checks so that floating-point overshoot cannot
/// push `acos` out of its domain; the boundaries return exactly 0° / 180°.
pub fn spin_opening_angle(spin1: Vector3<f64>, spin2: Vector3<f64>) -> f64 {
    let (mut a1, a1_norm) = spin_vector(spin1.x, spin1.y, spin1.z);
    if a1_norm == 0.0 {
        return 0.0;
    }
    a1 /= a1_norm;

    let (mut a2, a2_norm) = spin_vector(spin2.x, spin2.y, spin2.z);
    if a2_norm == 0.0 {
        return 0.0;
    }
    a2 /= a2_norm;

    let dot = a1.dot(&a2);
    if round_metadata(dot) == 1.0 {
        0.0
    } else if round_metadata(dot) == -1.0 {
        180.0
    } else {
        dot.acos().to_degrees()
    }
}

/// Normalised alignment of the total spin `S = S₁ + S₂` with the orbital
/// angular momentum axis, as `(Ŝ·L̂, angle in degrees)`.
///
/// Returns `(0, 0)` when the summed spin vanishes.
pub fn total_spin_alignment(
    mass_ratio: f64,
    spin1: Vector3<f64>,
    spin2: Vector3<f64>,
) -> (f64, f64) {
    let mass1 = mass_ratio / (1.0 + mass_ratio);
    let mass2 = 1.0 - mass1;

    let a1 = spin1.map(round_metadata);
    let a2 = spin2.map(round_metadata);

    let s = a1 * mass1 * mass1 + a2 * mass2 * mass2;
    if s.norm() > 0.0 {
        let s_dot_l = s.dot(&l_hat()) / s.norm();
        (s_dot_l, s_dot_l.acos().to_degrees())
    } else {
        (0.0, 0.0)
    }
}
