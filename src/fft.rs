//! In-place radix-2 Cooley–Tukey transform used by the matched filter.
//!
//! Only power-of-two lengths are supported; callers zero-pad to the next
//! power of two before transforming. The inverse transform is unscaled,
//! so a round trip multiplies the input by the signal length.

use std::f64::consts::PI;

use num_complex::Complex64;

/// Transform direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Time to frequency, kernel `e^{-2πi kn/N}`.
    Forward,
    /// Frequency to time, kernel `e^{+2πi kn/N}`, no `1/N` scaling.
    Inverse,
}

/// Compute the transform of `buf` in place.
///
/// # Panics
/// Panics if the buffer length is not a power of two. Lengths 0 and 1 are
/// returned untouched.
pub fn transform(buf: &mut [Complex64], direction: Direction) {
    let n = buf.len();
    if n <= 1 {
        return;
    }
    assert!(n.is_power_of_two(), "transform length must be a power of two");

    // Bit-reversal permutation.
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if j > i {
            buf.swap(i, j);
        }
    }

    let sign = match direction {
        Direction::Forward => -1.0,
        Direction::Inverse => 1.0,
    };

    let mut len = 2;
    while len <= n {
        let step = sign * 2.0 * PI / len as f64;
        let w_len = Complex64::from_polar(1.0, step);
        for start in (0..n).step_by(len) {
            let mut w = Complex64::new(1.0, 0.0);
            for k in 0..len / 2 {
                let a = buf[start + k];
                let b = buf[start + k + len / 2] * w;
                buf[start + k] = a + b;
                buf[start + k + len / 2] = a - b;
                w *= w_len;
            }
        }
        len <<= 1;
    }
}

/// Forward transform of a real signal, returning the one-sided spectrum
/// (bins `0..=n/2`). The input length must be a power of two.
pub fn real_forward(signal: &[f64]) -> Vec<Complex64> {
    let mut buf: Vec<Complex64> = signal
        .iter()
        .map(|&x| Complex64::new(x, 0.0))
        .collect();
    transform(&mut buf, Direction::Forward);
    buf.truncate(signal.len() / 2 + 1);
    buf
}
