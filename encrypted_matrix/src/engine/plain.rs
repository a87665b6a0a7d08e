use crate::{Error, Result};

use super::HeEngine;

#[derive(Debug, Clone, PartialEq)]
/// A plaintext of [`PlainSlots`]: the padded slots and the level they were encoded for.
pub struct PlainPlaintext {
    /// The slot values.
    pub slots: Vec<f64>,

    /// The level a ciphertext must be at to combine with this plaintext.
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq)]
/// A "ciphertext" of [`PlainSlots`]: the raw slots plus a level counter.
pub struct PlainCiphertext {
    /// The slot values.
    pub slots: Vec<f64>,

    /// The level, which only ever decreases.
    pub level: usize,
}

#[derive(Debug, Clone)]
/// An [`HeEngine`] that performs every operation directly on unencrypted slot vectors.
///
/// # Remarks
/// Scales are fixed at `1`, so arithmetic is exact for exactly representable inputs. Levels
/// are tracked (and enforced) so the full multiplication pipeline can run unencrypted, but the
/// modulus is unbounded. Rotations need no keys.
///
/// Running the diagonal method through this engine with unperturbed diagonals must reproduce
/// `selector * x` exactly.
pub struct PlainSlots {
    slot_count: usize,
    levels: usize,
}

impl PlainSlots {
    /// Creates an engine with `slot_count` slots and `levels` as its top level.
    pub fn new(slot_count: usize, levels: usize) -> Self {
        Self { slot_count, levels }
    }

    fn check_slots(&self, slots: &[f64]) -> Result<()> {
        if slots.len() != self.slot_count {
            return Err(Error::DimensionMismatch {
                expected: self.slot_count,
                actual: slots.len(),
            });
        }

        Ok(())
    }

    fn check_level(op: &'static str, a: usize, b: usize) -> Result<()> {
        if a != b {
            return Err(Error::IncompatibleOperands {
                op,
                lhs_scale: 1.0,
                rhs_scale: 1.0,
                lhs_level: a,
                rhs_level: b,
            });
        }

        Ok(())
    }

    fn zip(
        &self,
        op: &'static str,
        a: &PlainCiphertext,
        b: (&[f64], usize),
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<PlainCiphertext> {
        Self::check_level(op, a.level, b.1)?;
        self.check_slots(&a.slots)?;
        self.check_slots(b.0)?;

        Ok(PlainCiphertext {
            slots: a.slots.iter().zip(b.0).map(|(x, y)| f(*x, *y)).collect(),
            level: a.level,
        })
    }
}

impl HeEngine for PlainSlots {
    type Plaintext = PlainPlaintext;
    type Ciphertext = PlainCiphertext;
    type RotationKeys = ();

    fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn top_level(&self) -> usize {
        self.levels
    }

    fn rescale_prime(&self, _level: usize) -> f64 {
        1.0
    }

    fn modulus_bits(&self, _level: usize) -> f64 {
        f64::INFINITY
    }

    fn encode(&self, values: &[f64], _scale: f64, level: usize) -> Result<PlainPlaintext> {
        if values.len() > self.slot_count {
            return Err(Error::SlotOverflow {
                len: values.len(),
                slot_count: self.slot_count,
            });
        }

        if level > self.levels {
            return Err(Error::LevelExhausted {
                from: self.levels,
                to: level as i64,
            });
        }

        let mut slots = values.to_vec();
        slots.resize(self.slot_count, 0.0);

        Ok(PlainPlaintext { slots, level })
    }

    fn decode(&self, pt: &PlainPlaintext) -> Result<Vec<f64>> {
        Ok(pt.slots.clone())
    }

    fn encrypt(&self, pt: &PlainPlaintext) -> Result<PlainCiphertext> {
        self.check_slots(&pt.slots)?;

        Ok(PlainCiphertext {
            slots: pt.slots.clone(),
            level: pt.level,
        })
    }

    fn decrypt(&self, ct: &PlainCiphertext) -> Result<PlainPlaintext> {
        Ok(PlainPlaintext {
            slots: ct.slots.clone(),
            level: ct.level,
        })
    }

    fn add(&self, a: &PlainCiphertext, b: &PlainCiphertext) -> Result<PlainCiphertext> {
        self.zip("add", a, (b.slots.as_slice(), b.level), |x, y| x + y)
    }

    fn add_plain(&self, a: &PlainCiphertext, b: &PlainPlaintext) -> Result<PlainCiphertext> {
        self.zip("add_plain", a, (b.slots.as_slice(), b.level), |x, y| x + y)
    }

    fn add_many(&self, cts: &[PlainCiphertext]) -> Result<PlainCiphertext> {
        let (first, rest) = cts.split_first().ok_or(Error::DimensionMismatch {
            expected: 1,
            actual: 0,
        })?;

        rest.iter().try_fold(first.clone(), |acc, x| self.add(&acc, x))
    }

    fn multiply(&self, a: &PlainCiphertext, b: &PlainCiphertext) -> Result<PlainCiphertext> {
        self.zip("multiply", a, (b.slots.as_slice(), b.level), |x, y| x * y)
    }

    fn multiply_plain(&self, a: &PlainCiphertext, b: &PlainPlaintext) -> Result<PlainCiphertext> {
        self.zip("multiply_plain", a, (b.slots.as_slice(), b.level), |x, y| x * y)
    }

    fn rotate(&self, a: &PlainCiphertext, steps: i64, _keys: &()) -> Result<PlainCiphertext> {
        let len = a.slots.len();
        let shift = steps.rem_euclid(len as i64) as usize;

        let mut slots = a.slots.clone();
        slots.rotate_left(shift);

        Ok(PlainCiphertext {
            slots,
            level: a.level,
        })
    }

    fn rescale_to_next(&self, a: &PlainCiphertext) -> Result<PlainCiphertext> {
        self.mod_switch_to_next(a)
    }

    fn mod_switch_to_next(&self, a: &PlainCiphertext) -> Result<PlainCiphertext> {
        let level = a.level.checked_sub(1).ok_or(Error::LevelExhausted {
            from: a.level,
            to: -1,
        })?;

        self.mod_switch_to(a, level)
    }

    fn mod_switch_to(&self, a: &PlainCiphertext, level: usize) -> Result<PlainCiphertext> {
        if level > a.level {
            return Err(Error::LevelExhausted {
                from: a.level,
                to: level as i64,
            });
        }

        Ok(PlainCiphertext {
            slots: a.slots.clone(),
            level,
        })
    }

    fn scale(&self, _a: &PlainCiphertext) -> f64 {
        1.0
    }

    fn plain_product_scale(&self, _ct_scale: f64, _pt_scale: f64) -> f64 {
        1.0
    }

    fn level(&self, a: &PlainCiphertext) -> usize {
        a.level
    }

    fn set_scale(&self, _a: &mut PlainCiphertext, _scale: f64) {}
}
