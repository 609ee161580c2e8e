//! Multiplication by repeated addition, composed from sub-machine calls.
//!
//! `op1 * op2` seeds the output with `op1` and a counter with 1, then loops:
//! compare counter to `op2` (`LESS_THAN` call), add `op1` to the output, add
//! one to the counter. The caller itself only renders boundary lines; the
//! sub-machine work happens in nested runs. Two grammar quirks on the input
//! side: the fabricated `LESS_THAN` halt shows the counter in conventional
//! digit order (never reversed), and the fabricated `ADD` halts carry the
//! stale carry a real run would leave.

use crate::error::{Error, Result};
use crate::machine::{call_block, parse_pair, Action, Checker, Command, Register, State, HALT_MESSAGE};
use crate::{addition, less_than, tape};

pub const TOKEN: &str = "MUL";

/// Canonical `q0` state line: counter and output both still empty.
pub fn init_state_line(op1: &str, op2: &str) -> String {
    format!(
        "{TOKEN}, q0, [HEAD1]{} [HEAD2]{} [COUNT] [OUTPUT]",
        tape::render(op1),
        tape::render(op2)
    )
}

/// Canonical `q0` command line: seed the counter with 1 and the output with
/// the first operand.
pub fn init_command_line(op1: &str) -> String {
    Command::new(
        vec![
            Action::Write(Register::Count, "1".to_string()),
            Action::WriteTape(Register::Output, tape::render(op1)),
        ],
        State::Q1.name(),
    )
    .render()
}

pub struct MultiplicationMachine {
    op1: u64,
    op2: u64,
    op1_t: String,
    op2_t: String,
    /// Loop counter; 0 until the `q0` step runs and renders as an empty
    /// field.
    cnt: u128,
    output_t: String,
    state: State,
}

impl MultiplicationMachine {
    pub fn new(op1: u64, op2: u64) -> Self {
        MultiplicationMachine {
            op1,
            op2,
            op1_t: tape::encode(op1 as u128),
            op2_t: tape::encode(op2 as u128),
            cnt: 0,
            output_t: String::new(),
            state: State::Q0,
        }
    }

    pub fn result(&self) -> u128 {
        self.op1 as u128 * self.op2 as u128
    }

    fn render_state(&self, phase: State, cnt: u128, output_t: &str) -> String {
        let count = if cnt > 0 { tape::render(&tape::encode(cnt)) } else { String::new() };
        let token = if phase == State::QH { "" } else { "[OUTPUT]" };
        format!(
            "{TOKEN}, {}, [HEAD1]{} [HEAD2]{} [COUNT]{count} {token}{}",
            phase.name(),
            tape::render(&self.op1_t),
            tape::render(&self.op2_t),
            tape::render(output_t)
        )
    }

    fn state_line(&self) -> String {
        self.render_state(self.state, self.cnt, &self.output_t)
    }

    fn command_line(&self) -> String {
        match self.state {
            State::Q0 => init_command_line(&self.op1_t),
            State::Q1 => Command::new(vec![Action::Call(less_than::TOKEN)], State::Q2.name()).render(),
            State::Q2 => Command::new(vec![Action::Call(addition::TOKEN)], State::Q3.name()).render(),
            State::Q3 => Command::new(vec![Action::Call(addition::TOKEN)], State::Q1.name()).render(),
            _ => HALT_MESSAGE.to_string(),
        }
    }

    fn call_init(&self) -> (String, String) {
        match self.state {
            State::Q1 => (
                less_than::init_state_line(&tape::encode(self.cnt), &self.op2_t),
                less_than::init_command_line(),
            ),
            State::Q2 => (
                addition::init_state_line(&self.op1_t, &self.output_t),
                addition::init_command_line(),
            ),
            State::Q3 => (
                addition::init_state_line(&tape::encode(self.cnt), "1"),
                addition::init_command_line(),
            ),
            _ => (String::new(), String::new()),
        }
    }

    fn call_halt(&self) -> String {
        match self.state {
            State::Q1 => {
                let verdict = if self.cnt < self.op2 as u128 { "True" } else { "False" };
                // Conventional digit order here, not tape order.
                less_than::halt_state_line(&self.cnt.to_string(), &self.op2_t, verdict)
            }
            State::Q2 => {
                let sum = tape::decode(&self.output_t).unwrap_or(0) + self.op1 as u128;
                let sum_t = tape::encode(sum);
                let carry =
                    (sum_t.len() > self.op1_t.len() && sum_t.len() > self.output_t.len()) as u32;
                addition::halt_state_line(&self.op1_t, &self.output_t, carry, &sum_t)
            }
            State::Q3 => {
                let cnt_t = tape::encode(self.cnt);
                let next_t = tape::encode(self.cnt + 1);
                let carry = (next_t.len() > cnt_t.len()) as u32;
                addition::halt_state_line(&cnt_t, "1", carry, &next_t)
            }
            _ => String::new(),
        }
    }

    fn step(&mut self) {
        match self.state {
            State::Q0 => {
                self.cnt = 1;
                self.output_t = self.op1_t.clone();
                self.state = State::Q1;
            }
            State::Q1 => {
                self.state = if self.cnt >= self.op2 as u128 { State::QH } else { State::Q2 };
            }
            State::Q2 => {
                let sum = tape::decode(&self.output_t).unwrap_or(0) + self.op1 as u128;
                self.output_t = tape::encode(sum);
                self.state = State::Q3;
            }
            State::Q3 => {
                self.cnt += 1;
                self.state = State::Q1;
            }
            _ => {}
        }
    }

    /// The full replay sequence of (input block, output block) pairs.
    pub fn transition_seq(&mut self) -> Vec<(String, String)> {
        let mut seq = Vec::new();
        while self.state != State::QH {
            let in_cmd = match self.state {
                State::Q0 => String::new(),
                _ => HALT_MESSAGE.to_string(),
            };
            let input =
                call_block(&self.state_line(), &self.command_line(), &self.call_halt(), &in_cmd);

            self.step();

            let (call_state, call_cmd) = self.call_init();
            let output =
                call_block(&self.state_line(), &self.command_line(), &call_state, &call_cmd);
            seq.push((input + "\n", output));
        }
        seq
    }

    /// Shortcut (initial block, halted block) pair without the intermediate
    /// loop rounds, for one-shot samples.
    pub fn boundary_blocks(&self) -> (String, String) {
        let input = format!(
            "{}\n{}\n",
            init_state_line(&self.op1_t, &self.op2_t),
            init_command_line(&self.op1_t)
        );
        let halt = self.render_state(State::QH, self.op2 as u128, &tape::encode(self.result()));
        (input, format!("{halt}\n{HALT_MESSAGE}"))
    }
}

/// Replay checker over the precomputed sequence.
pub struct MultiplicationChecker {
    seq: Vec<(String, String)>,
    step: usize,
}

impl MultiplicationChecker {
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let (op1, op2) =
            parse_pair(line, TOKEN, None, &["[HEAD1]", "[HEAD2]", "[COUNT]", "[OUTPUT]"])?;
        let op1 = u64::try_from(op1).map_err(|_| Error::Format(line.to_string()))?;
        let op2 = u64::try_from(op2).map_err(|_| Error::Format(line.to_string()))?;
        let mut machine = MultiplicationMachine::new(op1, op2);
        Ok(MultiplicationChecker { seq: machine.transition_seq(), step: 0 })
    }
}

impl Checker for MultiplicationChecker {
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
    fn test_full_replay_4513_times_3() {
        let mut machine = MultiplicationMachine::new(4513, 3);
        let seq = machine.transition_seq();
        // One seed round, two loop passes of three rounds, one exit round.
        assert_eq!(seq.len(), 8);
        assert_eq!(
            seq[0].0,
            "MUL, q0, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT] [OUTPUT]\n\
             CMD [COUNT] 1, [OUTPUT]|3|1|5|4, q1\n"
        );
        assert_eq!(
            seq[0].1,
            "MUL, q1, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|1 [OUTPUT]|3|1|5|4\n\
             CMD [CALL] LESS_THAN, q2\n\
             LESS_THAN, q0, [HEAD1] |1[HEAD2] |3 [OUTPUT]\n\
             CMD [HEAD1] RIGHT, [HEAD2] RIGHT, [OUTPUT] False, q1"
        );
        assert_eq!(
            seq[1].0,
            "MUL, q1, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|1 [OUTPUT]|3|1|5|4\n\
             CMD [CALL] LESS_THAN, q2\n\
             LESS_THAN, qH,  |1[HEAD1] |3[HEAD2] True\n\
             No command to execute. Halt state.\n"
        );
        assert_eq!(
            seq[1].1,
            "MUL, q2, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|1 [OUTPUT]|3|1|5|4\n\
             CMD [CALL] ADD, q3\n\
             ADD, q0, [HEAD1] |3|1|5|4[HEAD2] |3|1|5|4 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1"
        );
        assert_eq!(
            seq[2].1,
            "MUL, q3, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|1 [OUTPUT]|6|2|0|9\n\
             CMD [CALL] ADD, q1\n\
             ADD, q0, [HEAD1] |1[HEAD2] |1 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1"
        );
        // The exit round: the comparison comes back False and the very next
        // block is the halted caller, with no separate unwind step.
        assert_eq!(
            seq[7].0,
            "MUL, q1, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|3 [OUTPUT]|9|3|5|3|1\n\
             CMD [CALL] LESS_THAN, q2\n\
             LESS_THAN, qH,  |3[HEAD1] |3[HEAD2] False\n\
             No command to execute. Halt state.\n"
        );
        assert_eq!(
            seq[7].1,
            "MUL, qH, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|3 |9|3|5|3|1\n\
             No command to execute. Halt state."
        );
        assert_eq!(machine.result(), 13539);
    }

    #[test]
    fn test_counter_in_fabricated_compare_is_conventional_order() {
        let mut machine = MultiplicationMachine::new(7, 12);
        let seq = machine.transition_seq();
        // At cnt = 10 the fabricated LESS_THAN halt shows "10" unreversed,
        // while the nested init on the output side shows the tape order "01".
        assert!(seq.iter().any(|(i, _)| i.contains("LESS_THAN, qH,  |1|0[HEAD1] |2|1[HEAD2] True")));
        assert!(seq.iter().any(|(_, o)| o.contains("LESS_THAN, q0, [HEAD1] |0|1[HEAD2] |2|1 [OUTPUT]")));
    }

    #[test]
    fn test_boundary_blocks_skip_the_loop() {
        let machine = MultiplicationMachine::new(4513, 3);
        let (input, output) = machine.boundary_blocks();
        assert_eq!(
            input,
            "MUL, q0, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT] [OUTPUT]\n\
             CMD [COUNT] 1, [OUTPUT]|3|1|5|4, q1\n"
        );
        assert_eq!(
            output,
            "MUL, qH, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|3 |9|3|5|3|1\n\
             No command to execute. Halt state."
        );
    }

    #[test]
    fn test_multiply_by_one_exits_immediately() {
        let mut machine = MultiplicationMachine::new(42, 1);
        let seq = machine.transition_seq();
        assert_eq!(seq.len(), 2);
        assert!(seq[1].1.starts_with("MUL, qH,"));
        assert!(seq[1].1.contains(" |2|4\n"));
    }

    #[test]
    fn test_checker_replays_and_rejects() {
        let mut machine = MultiplicationMachine::new(4513, 3);
        let seq = machine.transition_seq();
        let mut checker = MultiplicationChecker::new(&seq[0].0).unwrap();
        for (_, output) in &seq {
            assert!(checker.check(output));
            checker.advance();
        }
        assert!(!checker.check(&seq[7].1));
        let checker = MultiplicationChecker::new(&seq[0].0).unwrap();
        assert!(!checker.check(&seq[1].1));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn halt_block_carries_product(a in 0u64..10_000, b in 1u64..30) {
            let mut machine = MultiplicationMachine::new(a, b);
            let seq = machine.transition_seq();
            let halt = seq.last().unwrap().1.lines().next().unwrap().to_string();
            let expected = format!(" {}", tape::render(&tape::encode(a as u128 * b as u128)));
            prop_assert!(halt.ends_with(&expected));
        }
    }
}
