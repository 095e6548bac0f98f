//! HyperLogLog cardinality sketch (§4.B).
//!
//! Dense byte-register implementation: `2^precision` one-byte registers,
//! each storing the maximum observed `rho` (leading zeros of the hashed
//! remainder, plus one) for its bucket. Precision 14 is the default (16384
//! registers, ~16 KiB, ~0.81% expected relative error); precision is
//! clamped to `[10, 16]`.

use crate::value_canon::stable_hash64;

/// Minimum supported precision.
pub const MIN_PRECISION: u8 = 10;
/// Maximum supported precision.
pub const MAX_PRECISION: u8 = 16;

/// A HyperLogLog sketch over canonicalized value bytes.
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    precision: u8,
    registers: Vec<u8>,
}

impl HyperLogLog {
    /// Create a new, empty sketch. `precision` is clamped into
    /// `[MIN_PRECISION, MAX_PRECISION]`.
    pub fn new(precision: u8) -> Self {
        let precision = precision.clamp(MIN_PRECISION, MAX_PRECISION);
        Self {
            precision,
            registers: vec![0u8; register_count(precision)],
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Update the sketch with one observed value (already canonicalized).
    pub fn insert(&mut self, bytes: &[u8]) {
        let hash = stable_hash64(bytes);
        let p = self.precision as u32;
        let index = (hash & (register_count(self.precision) as u64 - 1)) as usize;
        let remainder = hash >> p;
        let rho = leading_zeros_of_remainder(remainder, p) + 1;
        if self.registers[index] < rho {
            self.registers[index] = rho;
        }
    }

    /// Estimated cardinality using the standard HLL estimator with small-
    /// and large-range bias correction.
    pub fn estimate(&self) -> u64 {
        let m = self.registers.len() as f64;
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 1.0 / (2.0f64).powi(r as i32))
            .sum();
        let zero_registers = self.registers.iter().filter(|&&r| r == 0).count();

        let alpha = alpha_for(self.precision);
        let mut estimate = alpha * m * m / sum;

        if estimate <= 2.5 * m && zero_registers > 0 {
            estimate = m * (m / zero_registers as f64).ln();
        } else if estimate > (1u64 << 32) as f64 / 30.0 {
            estimate = -((1u64 << 32) as f64) * (1.0 - estimate / (1u64 << 32) as f64).ln();
        }

        estimate.round().max(0.0) as u64
    }

    /// Merge another sketch's registers into this one, register-wise max.
    /// Sketches of differing precision are merged at the lower precision by
    /// folding the finer sketch's registers down; in practice all sketches
    /// in one process share `AnalyzerConfig::hll_precision`, so this path is
    /// rare (cross-session reconciliation only).
    pub fn merge(&mut self, other: &HyperLogLog) {
        if self.precision == other.precision {
            for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
                if *b > *a {
                    *a = *b;
                }
            }
            return;
        }

        // Fold down to the coarser precision before merging.
        let target = self.precision.min(other.precision);
        if self.precision != target {
            *self = self.folded_to(target);
        }
        let other_folded;
        let other_ref = if other.precision != target {
            other_folded = other.folded_to(target);
            &other_folded
        } else {
            other
        };
        for (a, b) in self.registers.iter_mut().zip(other_ref.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
    }

    fn folded_to(&self, target_precision: u8) -> HyperLogLog {
        debug_assert!(target_precision <= self.precision);
        let mut folded = HyperLogLog::new(target_precision);
        let shift = self.precision - target_precision;
        for (index, &reg) in self.registers.iter().enumerate() {
            let folded_index = index >> shift;
            // Losing the low bits of the index means the high bits that
            // would have counted towards rho are now folded in too.
            let adjusted = reg.saturating_add(shift);
            if folded.registers[folded_index] < adjusted {
                folded.registers[folded_index] = adjusted;
            }
        }
        folded
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }
}

fn register_count(precision: u8) -> usize {
    1usize << precision
}

fn leading_zeros_of_remainder(remainder: u64, p: u32) -> u8 {
    let remainder_bits = 64 - p;
    if remainder == 0 {
        return remainder_bits as u8;
    }
    (remainder.leading_zeros() - p).min(remainder_bits) as u8
}

fn alpha_for(precision: u8) -> f64 {
    let m = register_count(precision) as f64;
    match precision {
        4 => 0.673,
        5 => 0.697,
        6 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sketch_estimates_zero() {
        let hll = HyperLogLog::new(14);
        assert!(hll.is_empty());
        assert_eq!(hll.estimate(), 0);
    }

    #[test]
    fn estimate_is_within_error_bound() {
        let mut hll = HyperLogLog::new(14);
        let m = 10_000u64;
        for i in 0..m {
            hll.insert(format!("user-{i}").as_bytes());
        }
        let estimate = hll.estimate();
        let error = (estimate as f64 - m as f64).abs() / m as f64;
        assert!(error <= 0.03, "error {error} exceeds bound, estimate={estimate}");
    }

    #[test]
    fn duplicate_inserts_do_not_inflate_estimate() {
        let mut hll = HyperLogLog::new(14);
        for _ in 0..1000 {
            hll.insert(b"same-value");
        }
        assert!(hll.estimate() <= 2);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = HyperLogLog::new(12);
        let mut b = HyperLogLog::new(12);
        for i in 0..500 {
            a.insert(format!("a-{i}").as_bytes());
        }
        for i in 0..500 {
            b.insert(format!("b-{i}").as_bytes());
        }

        let mut merged_ab = a.clone();
        merged_ab.merge(&b);
        let mut merged_ba = b.clone();
        merged_ba.merge(&a);

        assert_eq!(merged_ab.registers, merged_ba.registers);
    }

    #[test]
    fn merge_with_self_is_idempotent() {
        let mut a = HyperLogLog::new(12);
        for i in 0..500 {
            a.insert(format!("v-{i}").as_bytes());
        }
        let before = a.clone();
        a.merge(&before.clone());
        assert_eq!(a.registers, before.registers);
    }

    #[test]
    fn precision_is_clamped() {
        assert_eq!(HyperLogLog::new(2).precision(), MIN_PRECISION);
        assert_eq!(HyperLogLog::new(30).precision(), MAX_PRECISION);
    }
}
