//! Subtraction by nines-complement, composed from sub-machine calls.
//!
//! `op1 - op2` runs as a fixed five-phase program: reflect `op2` against an
//! all-nines base as wide as `op1`, add the reflection to `op1`, add one,
//! then left-mask the extra top digit away. Each phase issues a `[CALL]` and
//! the trace interleaves the caller's lines with the callee's boundary
//! lines. The input side of every transition is fabricated from the
//! precomputed phase values (carry shown as 0, the mask result unrendered by
//! any trim), and is never what a real nested run would leave behind; only
//! the output side is checked.

use crate::error::{Error, Result};
use crate::machine::{call_block, parse_pair, Action, Checker, Command, State, HALT_MESSAGE};
use crate::{addition, left_mask, reflection, tape};

pub const TOKEN: &str = "SUB";

/// Canonical `q0` state line. The output field is empty before halt, leaving
/// a trailing space.
pub fn init_state_line(op1: &str, op2: &str) -> String {
    format!("{TOKEN}, q0, [HEAD1]{} [HEAD2]{} ", tape::render(op1), tape::render(op2))
}

/// Canonical `q0` command line.
pub fn init_command_line() -> String {
    Command::new(vec![], State::Q1.name()).render()
}

const PHASES: [State; 6] = [State::Q0, State::Q1, State::Q2, State::Q3, State::Q4, State::QH];

pub struct SubtractionMachine {
    op1: u64,
    op2: u64,
    /// Tape-order operand and phase-value digit strings.
    op1_t: String,
    op2_t: String,
    base_t: String,
    refl_t: String,
    add1_t: String,
    add2_t: String,
    mask_t: String,
}

impl SubtractionMachine {
    pub fn new(op1: u64, op2: u64) -> Result<Self> {
        if op1 < op2 {
            return Err(Error::Underflow { op1, op2 });
        }
        let width = op1.to_string().len();
        let base = 10u128.pow(width as u32) - 1;
        let refl = base - op2 as u128;
        let add1 = op1 as u128 + refl;
        let add2 = add1 + 1;
        let add2_t = tape::encode(add2);
        // Masking drops the top digit as a string cut, so a zero exposed at
        // the top stays on the tape.
        let mask_t = add2_t[..add2_t.len() - 1].to_string();
        Ok(SubtractionMachine {
            op1,
            op2,
            op1_t: tape::encode(op1 as u128),
            op2_t: tape::encode(op2 as u128),
            base_t: "9".repeat(width),
            refl_t: tape::encode(refl),
            add1_t: tape::encode(add1),
            add2_t,
            mask_t,
        })
    }

    pub fn result(&self) -> u64 {
        self.op1 - self.op2
    }

    fn state_line(&self, phase: State) -> String {
        match phase {
            State::Q0 => init_state_line(&self.op1_t, &self.op2_t),
            State::QH => format!(
                "{TOKEN}, qH, [HEAD1]{} [HEAD2]{} {}",
                tape::render(&self.op1_t),
                tape::render(&self.op2_t),
                tape::render(&tape::encode(self.result() as u128))
            ),
            _ => format!(
                "{TOKEN}, {}, [HEAD1]{} [HEAD2]{} ",
                phase.name(),
                tape::render(&self.op1_t),
                tape::render(&self.op2_t)
            ),
        }
    }

    fn command_line(&self, phase: State) -> String {
        match phase {
            State::Q0 => init_command_line(),
            State::Q1 => Command::new(vec![Action::Call(reflection::TOKEN)], State::Q2.name()).render(),
            State::Q2 => Command::new(vec![Action::Call(addition::TOKEN)], State::Q3.name()).render(),
            State::Q3 => Command::new(vec![Action::Call(addition::TOKEN)], State::Q4.name()).render(),
            State::Q4 => Command::new(vec![Action::Call(left_mask::TOKEN)], State::QH.name()).render(),
            _ => HALT_MESSAGE.to_string(),
        }
    }

    /// Callee initialization lines shown on the output side of a call.
    fn call_init(&self, phase: State) -> (String, String) {
        match phase {
            State::Q1 => (
                reflection::init_state_line(&self.base_t, &self.op2_t),
                reflection::init_command_line(),
            ),
            State::Q2 => (
                addition::init_state_line(&self.op1_t, &self.refl_t),
                addition::init_command_line(),
            ),
            State::Q3 => (
                addition::init_state_line(&self.add1_t, "1"),
                addition::init_command_line(),
            ),
            State::Q4 => (
                left_mask::init_state_line(&self.add2_t),
                left_mask::init_command_line(),
            ),
            _ => (String::new(), String::new()),
        }
    }

    /// Fabricated callee halt line shown on the input side of a call.
    fn call_halt(&self, phase: State) -> String {
        match phase {
            State::Q1 => reflection::halt_state_line(&self.base_t, &self.op2_t, &self.refl_t),
            State::Q2 => addition::halt_state_line(&self.op1_t, &self.refl_t, 0, &self.add1_t),
            State::Q3 => addition::halt_state_line(&self.add1_t, "1", 0, &self.add2_t),
            State::Q4 => left_mask::halt_state_line(&self.add2_t, &self.mask_t),
            _ => String::new(),
        }
    }

    /// The full replay sequence of (input block, output block) pairs. Input
    /// blocks carry a trailing newline, output blocks do not.
    pub fn transition_seq(&self) -> Vec<(String, String)> {
        PHASES
            .windows(2)
            .map(|w| {
                let (cur, next) = (w[0], w[1]);
                let in_cmd = match cur {
                    State::Q0 => String::new(),
                    _ => HALT_MESSAGE.to_string(),
                };
                let input =
                    call_block(&self.state_line(cur), &self.command_line(cur), &self.call_halt(cur), &in_cmd);
                let (call_state, call_cmd) = self.call_init(next);
                let output = call_block(
                    &self.state_line(next),
                    &self.command_line(next),
                    &call_state,
                    &call_cmd,
                );
                (input + "\n", output)
            })
            .collect()
    }
}

/// Replay checker: the whole sequence is precomputed at construction and
/// candidates are compared block-for-block. A mismatch never advances the
/// position.
pub struct SubtractionChecker {
    seq: Vec<(String, String)>,
    step: usize,
}

impl SubtractionChecker {
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let (op1, op2) = parse_pair(line, TOKEN, None, &["[HEAD1]", "[HEAD2]", "[OUTPUT]"])?;
        let op1 = u64::try_from(op1).map_err(|_| Error::Format(line.to_string()))?;
        let op2 = u64::try_from(op2).map_err(|_| Error::Format(line.to_string()))?;
        let machine = SubtractionMachine::new(op1, op2)?;
        Ok(SubtractionChecker { seq: machine.transition_seq(), step: 0 })
    }
}

impl Checker for SubtractionChecker {
    fn check(&self, candidate: &str) -> bool {
        match self.seq.get(self.step) {
            Some((_, expected)) => candidate.trim() == expected,
            None => false,
        }
    }

    fn advance(&mut self) {
        if self.step <= self.seq.len() {
            self.step += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_replay_47819_minus_12345() {
        let machine = SubtractionMachine::new(47819, 12345).unwrap();
        let seq = machine.transition_seq();
        assert_eq!(seq.len(), 5);
        assert_eq!(
            seq[0].0,
            "SUB, q0, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 \nCMD q1\n"
        );
        assert_eq!(
            seq[0].1,
            "SUB, q1, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 \n\
             CMD [CALL] REFLECTION, q2\n\
             REFLECTION, q0, [HEAD1] |9|9|9|9|9[HEAD2] |5|4|3|2|1 [OUTPUT]\n\
             CMD [HEAD1] RIGHT, [HEAD2] RIGHT, q1"
        );
        assert_eq!(
            seq[1].0,
            "SUB, q1, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 \n\
             CMD [CALL] REFLECTION, q2\n\
             REFLECTION, qH,  |9|9|9|9|9[HEAD1] |5|4|3|2|1[HEAD2] |4|5|6|7|8\n\
             No command to execute. Halt state.\n"
        );
        assert_eq!(
            seq[1].1,
            "SUB, q2, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 \n\
             CMD [CALL] ADD, q3\n\
             ADD, q0, [HEAD1] |9|1|8|7|4[HEAD2] |4|5|6|7|8 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1"
        );
        assert_eq!(
            seq[2].1,
            "SUB, q3, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 \n\
             CMD [CALL] ADD, q4\n\
             ADD, q0, [HEAD1] |3|7|4|5|3|1[HEAD2] |1 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1"
        );
        assert_eq!(
            seq[3].1,
            "SUB, q4, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 \n\
             CMD [CALL] LEFT_MASK, qH\n\
             LEFT_MASK, q0, [HEAD] |4|7|4|5|3|1 [OUTPUT]\n\
             CMD [HEAD] RIGHT, q1"
        );
        assert_eq!(
            seq[4].0,
            "SUB, q4, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 \n\
             CMD [CALL] LEFT_MASK, qH\n\
             LEFT_MASK, qH,  |4|7|4|5|3|1[HEAD] |4|7|4|5|3\n\
             No command to execute. Halt state.\n"
        );
        assert_eq!(
            seq[4].1,
            "SUB, qH, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 |4|7|4|5|3\n\
             No command to execute. Halt state."
        );
        assert_eq!(machine.result(), 35474);
    }

    #[test]
    fn test_fabricated_mask_input_keeps_exposed_zero() {
        // 100 - 95: add2 = 100 + 904 + 1 = 1005, masked to 005. The
        // fabricated left-mask halt keeps both zeros; a real run trims them.
        let machine = SubtractionMachine::new(100, 95).unwrap();
        let seq = machine.transition_seq();
        assert!(seq[4].0.contains("LEFT_MASK, qH,  |5|0|0|1[HEAD] |5|0|0\n"));
        // The caller's own halt line shows the numeric difference, trimmed.
        assert!(seq[4].1.contains("SUB, qH, [HEAD1]|0|0|1 [HEAD2]|5|9 |5\n"));
        assert_eq!(machine.result(), 5);
    }

    #[test]
    fn test_underflow_is_a_construction_error() {
        assert!(matches!(
            SubtractionMachine::new(5, 6),
            Err(Error::Underflow { op1: 5, op2: 6 })
        ));
    }

    #[test]
    fn test_checker_replays_and_rejects() {
        let machine = SubtractionMachine::new(47819, 12345).unwrap();
        let seq = machine.transition_seq();
        let mut checker = SubtractionChecker::new(&seq[0].0).unwrap();
        for (_, output) in &seq {
            assert!(checker.check(output));
            checker.advance();
        }
        // Past the end of the sequence everything fails.
        assert!(!checker.check(&seq[4].1));
        let mut checker = SubtractionChecker::new(&seq[0].0).unwrap();
        assert!(!checker.check(&seq[1].1));
        checker.advance();
        assert!(!checker.check(&seq[0].1));
    }

    #[test]
    fn test_checker_rejects_malformed_init() {
        assert!(SubtractionChecker::new("garbage").is_err());
        assert!(SubtractionChecker::new("SUB, q0, [HEAD1]|6 [HEAD2]|7 ").is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn subtraction_halt_block_carries_difference(a in 0u64..10_000_000, b in 0u64..10_000_000) {
            let (op1, op2) = if a >= b { (a, b) } else { (b, a) };
            let machine = SubtractionMachine::new(op1, op2).unwrap();
            let seq = machine.transition_seq();
            let halt = seq.last().unwrap().1.lines().next().unwrap().to_string();
            let expected = format!(" {}", tape::render(&tape::encode((op1 - op2) as u128)));
            prop_assert!(halt.ends_with(&expected));
        }
    }
}
