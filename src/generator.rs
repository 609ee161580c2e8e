//! Operand sampling and sequence generation for dataset construction.
//!
//! Sampling is seeded so the same cell of the digit grid reproduces the same
//! operands across runs. Sequence text always comes from the machines via
//! the registry, never from templates.

use crate::aligner;
use crate::error::{Error, Result};
use crate::registry::{self, Op};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Largest value with `n_digits` decimal digits. Callers cap digit widths
/// at 19, the widest that fits a u64.
pub fn nines(n_digits: u32) -> u64 {
    10u64.pow(n_digits) - 1
}

/// Uniform sampler over fixed-width decimal ranges.
pub struct DigitSampler {
    rng: SmallRng,
}

impl DigitSampler {
    pub fn new(seed: u64) -> Self {
        DigitSampler { rng: SmallRng::seed_from_u64(seed) }
    }

    /// Uniform value with exactly `n_digits` digits; width 1 includes zero.
    pub fn n_digit(&mut self, n_digits: u32) -> u64 {
        let minimal = if n_digits > 1 { 10u64.pow(n_digits - 1) } else { 0 };
        self.rng.gen_range(minimal..=nines(n_digits))
    }

    pub fn range(&mut self, minimal: u64, maximal: u64) -> u64 {
        self.rng.gen_range(minimal..=maximal)
    }
}

/// Operand bias for equality sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualBias {
    Equal,
    Random,
}

/// Operand bias for ordering comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareBias {
    Equal,
    Greater,
    Less,
}

/// Samples operands per operation and renders their transition sequences.
pub struct SeqGenerator {
    rng: SmallRng,
    sampler: DigitSampler,
}

impl SeqGenerator {
    pub fn new(seed: u64) -> Self {
        SeqGenerator { rng: SmallRng::seed_from_u64(seed), sampler: DigitSampler::new(seed) }
    }

    pub fn add_ops(&mut self, a_n_digits: u32, b_n_digits: u32) -> (u64, u64) {
        (self.sampler.n_digit(a_n_digits), self.sampler.n_digit(b_n_digits))
    }

    /// Operands ordered so the minuend is never smaller.
    pub fn sub_ops(&mut self, a_n_digits: u32, b_n_digits: u32) -> (u64, u64) {
        let (op1, op2) = self.add_ops(a_n_digits, b_n_digits);
        if op1 < op2 { (op2, op1) } else { (op1, op2) }
    }

    pub fn equal_ops(&mut self, a_n_digits: u32, b_n_digits: u32, bias: EqualBias) -> (u64, u64) {
        let op1 = self.sampler.n_digit(a_n_digits);
        let op2 = match bias {
            EqualBias::Equal => op1,
            EqualBias::Random => self.sampler.n_digit(b_n_digits),
        };
        (op1, op2)
    }

    pub fn compare_ops(
        &mut self,
        a_n_digits: u32,
        b_n_digits: u32,
        bias: Option<CompareBias>,
    ) -> (u64, u64) {
        let mut op1 = self.sampler.n_digit(a_n_digits);
        let mut op2 = self.sampler.n_digit(b_n_digits);
        match bias {
            Some(CompareBias::Equal) => op2 = op1,
            Some(CompareBias::Greater) if op1 <= op2 => std::mem::swap(&mut op1, &mut op2),
            Some(CompareBias::Less) if op1 >= op2 => std::mem::swap(&mut op1, &mut op2),
            _ => {}
        }
        (op1, op2)
    }

    /// All-nines base plus an operand no wider than the base.
    pub fn reflection_ops(&mut self, a_n_digits: u32, b_n_digits: u32) -> (u64, u64) {
        (nines(a_n_digits), self.sampler.n_digit(b_n_digits))
    }

    /// Variant whose reflection carries leading zeros: a random-length prefix
    /// of the operand is forced to nines.
    pub fn reflection_leading_zero_ops(&mut self, n_digits: u32) -> (u64, u64) {
        let op2 = self.sampler.n_digit(n_digits);
        let length = self.rng.gen_range(1..=n_digits) as usize;
        let mut digits = format!("{op2:0width$}", width = n_digits as usize);
        digits.replace_range(..length, &"9".repeat(length));
        (nines(n_digits), digits.parse().unwrap_or(op2))
    }

    /// Operand for left-mask. Without `leading_zero` the value carries a run
    /// of zeros below its top digit; with it the second digit is forced
    /// nonzero. Width 1 degenerates to a plain nonzero digit.
    pub fn left_mask_op(&mut self, n_digits: u32, leading_zero: bool) -> u64 {
        if leading_zero {
            let mut op = self.sampler.n_digit(n_digits);
            let text = op.to_string();
            if text.len() >= 2 && text.as_bytes()[1] == b'0' {
                op += self.rng.gen_range(1..=9) * 10u64.pow(text.len() as u32 - 2);
            }
            return op;
        }
        if n_digits == 1 {
            return self.rng.gen_range(1..=9);
        }
        let num_leading_zero = self.rng.gen_range(1..=n_digits - 1);
        let mut op = self.rng.gen_range(1..=9) * 10u64.pow(n_digits - 1);
        if num_leading_zero != n_digits - 1 {
            op += self.sampler.n_digit(n_digits - num_leading_zero - 1);
        }
        op
    }

    pub fn mul_ops(&mut self, a_n_digits: u32, b_n_digits: u32) -> (u64, u64) {
        self.add_ops(a_n_digits, b_n_digits)
    }

    /// Division operands, rejecting zero divisors and quotients of a million
    /// or more. Gives up after 50 draws.
    pub fn div_ops(&mut self, a_n_digits: u32, b_n_digits: u32) -> Option<(u64, u64)> {
        for _ in 0..50 {
            let op1 = self.sampler.n_digit(a_n_digits);
            let op2 = self.sampler.n_digit(b_n_digits);
            if op2 == 0 || op1 / op2 >= 1_000_000 {
                continue;
            }
            return Some((op1, op2));
        }
        None
    }

    /// Raw expression and answer for an operation with notation.
    pub fn raw_pair(&mut self, op: Op, op1: u64, op2: u64) -> Result<(String, String)> {
        let symbol = op.symbol().ok_or_else(|| Error::UnknownOp(op.task().to_string()))?;
        Ok((format!("{op1}{symbol}{op2}="), raw_answer(op, op1, op2)?))
    }

    /// Raw multiplication with a small multiplier so the loop stays short.
    pub fn mul_raw_fixed_op2(&mut self, a_n_digits: u32, op2: Option<u64>) -> (String, String) {
        let op1 = self.sampler.n_digit(a_n_digits);
        let op2 = op2.unwrap_or_else(|| self.sampler.range(1, 15));
        (format!("{op1}*{op2}="), (op1 as u128 * op2 as u128).to_string())
    }

    /// Raw division constructed backwards from a small quotient.
    pub fn div_raw_fixed_result(&mut self, b_n_digits: u32, result: Option<u64>) -> (String, String) {
        let result = result.unwrap_or_else(|| self.sampler.range(2, 3));
        let mut op2 = 0;
        while op2 == 0 {
            op2 = self.sampler.n_digit(b_n_digits);
        }
        let mut op1 = result * op2;
        if op2 > 1 {
            op1 += self.rng.gen_range(0..=op2 - 1);
        }
        (format!("{op1}//{op2}="), (op1 / op2).to_string())
    }
}

/// Conventional-notation answer for an operation's operands.
pub fn raw_answer(op: Op, op1: u64, op2: u64) -> Result<String> {
    Ok(match op {
        Op::Add => (op1 as u128 + op2 as u128).to_string(),
        Op::Sub => op1.checked_sub(op2).ok_or(Error::Underflow { op1, op2 })?.to_string(),
        Op::Mul => (op1 as u128 * op2 as u128).to_string(),
        Op::Div => {
            if op2 == 0 {
                return Err(Error::DivByZero);
            }
            (op1 / op2).to_string()
        }
        Op::Equal => if op1 == op2 { "True" } else { "False" }.to_string(),
        Op::GreaterThan => if op1 > op2 { "True" } else { "False" }.to_string(),
        Op::LessThan => if op1 < op2 { "True" } else { "False" }.to_string(),
        Op::Reflection | Op::LeftMask => {
            return Err(Error::UnknownOp(op.task().to_string()));
        }
    })
}

/// Alignment training pairs: raw notation against machine boundary text.
pub struct AlignerPairGenerator {
    rng: SmallRng,
    sampler: DigitSampler,
}

impl AlignerPairGenerator {
    pub fn new(seed: u64) -> Self {
        AlignerPairGenerator {
            rng: SmallRng::seed_from_u64(seed),
            sampler: DigitSampler::new(seed),
        }
    }

    fn notation_ops() -> Vec<Op> {
        registry::ALL.into_iter().filter(|op| op.symbol().is_some()).collect()
    }

    fn check_ops(op: Op, op1: u64, op2: u64) -> bool {
        match op {
            Op::Mul => op1.to_string().len() <= 10 && op2.to_string().len() <= 5,
            Op::Div => {
                op2 != 0
                    && op1.to_string().len() <= 10
                    && op2.to_string().len() <= 10
                    && (op1 / op2).to_string().len() < 5
            }
            _ => true,
        }
    }

    fn adapt_ops(&mut self, op: Op, op1: u64, op2: u64) -> (u64, u64) {
        match op {
            Op::Sub if op1 < op2 => (op2, op1),
            Op::Equal if self.rng.gen_range(0..=1) == 0 => (op1, op1),
            _ => (op1, op2),
        }
    }

    /// Raw expression paired with its aligned initial state. `None` when the
    /// sampled operands fall outside the operation's supported widths.
    pub fn input_pair(
        &mut self,
        a_n_digits: u32,
        b_n_digits: u32,
        op: Option<Op>,
    ) -> Result<Option<(String, String)>> {
        let op1 = self.sampler.n_digit(a_n_digits);
        let op2 = self.sampler.n_digit(b_n_digits);
        let op = op.unwrap_or_else(|| {
            let ops = Self::notation_ops();
            ops[self.rng.gen_range(0..ops.len())]
        });
        let (op1, op2) = self.adapt_ops(op, op1, op2);
        if !Self::check_ops(op, op1, op2) {
            return Ok(None);
        }
        let symbol = op.symbol().ok_or_else(|| Error::UnknownOp(op.task().to_string()))?;
        let input = format!("{op1}{symbol}{op2}=");
        let output = aligner::input_to_tm(&input)?;
        Ok(Some((input, output)))
    }

    /// Halted machine block paired with its result notation.
    pub fn output_pair(
        &mut self,
        a_n_digits: u32,
        b_n_digits: u32,
        op: Option<Op>,
    ) -> Result<Option<(String, String)>> {
        let op1 = self.sampler.n_digit(a_n_digits);
        let op2 = self.sampler.n_digit(b_n_digits);
        let op = op.unwrap_or_else(|| {
            let ops = Self::notation_ops();
            ops[self.rng.gen_range(0..ops.len())]
        });
        let (op1, op2) = self.adapt_ops(op, op1, op2);
        if !Self::check_ops(op, op1, op2) {
            return Ok(None);
        }
        let seq = registry::transitions_for(op, op1, op2)?;
        let last = seq.last().ok_or_else(|| Error::Format(op.task().to_string()))?;
        // Composite halt blocks already carry both lines in the output slot.
        let splits: Vec<&str> = last.1.split('\n').collect();
        let (state, command) = if splits.len() == 2 {
            (splits[0].to_string(), splits[1].to_string())
        } else {
            (last.0.clone(), last.1.clone())
        };
        let output =
            aligner::tm_to_output(&state, &op1.to_string(), &op2.to_string(), op.task())?;
        Ok(Some((format!("{state}\n{command}"), output)))
    }
}

/// Per-cell sample budget over the digit grid.
///
/// The balanced budgets skew toward short operands and away from cells a
/// machine handles poorly or identically, keeping dataset size manageable
/// without starving any regime.
pub struct Proportioner {
    pub minimal: u32,
    pub maximal: u32,
    pub num: usize,
}

/// What the budget is for: one operation's grid, or the alignment grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    Task(Op),
    Align,
}

impl Proportioner {
    pub fn new(minimal: u32, maximal: u32, num: usize) -> Self {
        Proportioner { minimal, maximal, num }
    }

    pub fn cell_count(&self, budget: Budget, a_n_digits: u32, b_n_digits: u32) -> usize {
        let num = self.num;
        let wide_and_lopsided = |a: u32, b: u32| {
            a > 10 && b > 10 && (a as f64 / b as f64 > 1.5 || b as f64 / a as f64 > 1.5)
        };
        match budget {
            Budget::Task(Op::Add) => {
                let mut num = num;
                if wide_and_lopsided(a_n_digits, b_n_digits) {
                    num /= 2;
                }
                if a_n_digits <= 10 && b_n_digits <= 10 {
                    num *= 10;
                }
                num
            }
            Budget::Task(Op::Sub) => {
                let mut num = num;
                if wide_and_lopsided(a_n_digits, b_n_digits) {
                    num /= 2;
                }
                if a_n_digits <= 10 && b_n_digits < 10 {
                    num *= 5;
                }
                num
            }
            Budget::Task(Op::Equal) => {
                if a_n_digits == b_n_digits {
                    let mut num = num * 10;
                    if a_n_digits <= 10 {
                        num *= 10;
                    }
                    num
                } else {
                    let choice = (self.maximal - self.minimal + 1) as usize;
                    (num * 10).div_ceil(choice)
                }
            }
            Budget::Task(Op::GreaterThan) | Budget::Task(Op::LessThan) => {
                if a_n_digits <= 5 && b_n_digits <= 5 { num * 10 } else { num }
            }
            Budget::Task(Op::Mul) | Budget::Align => {
                if a_n_digits <= 10 || b_n_digits <= 10 { num * 2 } else { num }
            }
            Budget::Task(Op::Div) => {
                if a_n_digits < b_n_digits {
                    return 5;
                }
                let gap = a_n_digits - b_n_digits;
                if gap > 5 {
                    return 0;
                }
                if gap <= 2 {
                    num * 2
                } else if gap > 3 {
                    num / 2
                } else {
                    num
                }
            }
            // Reflection and left-mask grids run flat.
            Budget::Task(Op::Reflection) | Budget::Task(Op::LeftMask) => num,
        }
    }
}
