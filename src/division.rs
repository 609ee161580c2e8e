//! Integer division by repeated addition, composed from sub-machine calls.
//!
//! `op1 // op2` seeds a counter with `op2` and the output with 0, then
//! loops: compare counter to `op1` (`GREATER_THAN` call), add one to the
//! output, add `op2` to the counter. The loop exits once the counter
//! overshoots the dividend, so the halted counter reads
//! `(quotient + 1) * op2`. Fabricated input-side halts carry the stale
//! carry a real `ADD` run would leave, and the comparison counter is shown
//! in tape order.

use crate::error::{Error, Result};
use crate::machine::{call_block, parse_pair, Action, Checker, Command, Register, State, HALT_MESSAGE};
use crate::{addition, greater_than, tape};

pub const TOKEN: &str = "DIV";

/// Canonical `q0` state line: counter and output both still empty.
pub fn init_state_line(op1: &str, op2: &str) -> String {
    format!(
        "{TOKEN}, q0, [HEAD1]{} [HEAD2]{} [COUNT] [OUTPUT]",
        tape::render(op1),
        tape::render(op2)
    )
}

/// Canonical `q0` command line: seed the counter with the divisor and the
/// output with 0.
pub fn init_command_line(op2: &str) -> String {
    Command::new(
        vec![
            Action::WriteTape(Register::Count, tape::render(op2)),
            Action::Write(Register::Output, "0".to_string()),
        ],
        State::Q1.name(),
    )
    .render()
}

pub struct DivisionMachine {
    op1: u64,
    op2: u64,
    op1_t: String,
    op2_t: String,
    /// Loop counter; unset until the `q0` step runs and renders as an empty
    /// field.
    cnt: Option<u128>,
    output_t: String,
    state: State,
}

impl DivisionMachine {
    pub fn new(op1: u64, op2: u64) -> Result<Self> {
        if op2 == 0 {
            return Err(Error::DivByZero);
        }
        Ok(DivisionMachine {
            op1,
            op2,
            op1_t: tape::encode(op1 as u128),
            op2_t: tape::encode(op2 as u128),
            cnt: None,
            output_t: String::new(),
            state: State::Q0,
        })
    }

    pub fn result(&self) -> u64 {
        self.op1 / self.op2
    }

    fn render_state(&self, phase: State, cnt: Option<u128>, output_t: &str) -> String {
        let count = match cnt {
            Some(c) => tape::render(&tape::encode(c)),
            None => String::new(),
        };
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
            State::Q0 => init_command_line(&self.op2_t),
            State::Q1 => {
                Command::new(vec![Action::Call(greater_than::TOKEN)], State::Q2.name()).render()
            }
            State::Q2 => Command::new(vec![Action::Call(addition::TOKEN)], State::Q3.name()).render(),
            State::Q3 => Command::new(vec![Action::Call(addition::TOKEN)], State::Q1.name()).render(),
            _ => HALT_MESSAGE.to_string(),
        }
    }

    fn cnt_t(&self) -> String {
        tape::encode(self.cnt.unwrap_or(0))
    }

    fn call_init(&self) -> (String, String) {
        match self.state {
            State::Q1 => (
                greater_than::init_state_line(&self.cnt_t(), &self.op1_t),
                greater_than::init_command_line(),
            ),
            State::Q2 => (
                addition::init_state_line(&self.output_t, "1"),
                addition::init_command_line(),
            ),
            State::Q3 => (
                addition::init_state_line(&self.op2_t, &self.cnt_t()),
                addition::init_command_line(),
            ),
            _ => (String::new(), String::new()),
        }
    }

    fn call_halt(&self) -> String {
        let cnt = self.cnt.unwrap_or(0);
        match self.state {
            State::Q1 => {
                let verdict = if cnt > self.op1 as u128 { "True" } else { "False" };
                greater_than::halt_state_line(&self.cnt_t(), &self.op1_t, verdict)
            }
            State::Q2 => {
                let next = tape::decode(&self.output_t).unwrap_or(0) + 1;
                let next_t = tape::encode(next);
                let carry = (next_t.len() > self.output_t.len()) as u32;
                addition::halt_state_line(&self.output_t, "1", carry, &next_t)
            }
            State::Q3 => {
                let cnt_t = self.cnt_t();
                let sum_t = tape::encode(cnt + self.op2 as u128);
                let carry = (sum_t.len() > self.op2_t.len() && sum_t.len() > cnt_t.len()) as u32;
                addition::halt_state_line(&self.op2_t, &cnt_t, carry, &sum_t)
            }
            _ => String::new(),
        }
    }

    fn step(&mut self) {
        match self.state {
            State::Q0 => {
                self.cnt = Some(self.op2 as u128);
                self.output_t = "0".to_string();
                self.state = State::Q1;
            }
            State::Q1 => {
                let cnt = self.cnt.unwrap_or(0);
                self.state = if cnt > self.op1 as u128 { State::QH } else { State::Q2 };
            }
            State::Q2 => {
                let next = tape::decode(&self.output_t).unwrap_or(0) + 1;
                self.output_t = tape::encode(next);
                self.state = State::Q3;
            }
            State::Q3 => {
                self.cnt = Some(self.cnt.unwrap_or(0) + self.op2 as u128);
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
            init_command_line(&self.op2_t)
        );
        let quotient = self.result() as u128;
        let halt_cnt = (quotient + 1) * self.op2 as u128;
        let halt = self.render_state(State::QH, Some(halt_cnt), &tape::encode(quotient));
        (input, format!("{halt}\n{HALT_MESSAGE}"))
    }
}

/// Replay checker over the precomputed sequence.
pub struct DivisionChecker {
    seq: Vec<(String, String)>,
    step: usize,
}

impl DivisionChecker {
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let (op1, op2) =
            parse_pair(line, TOKEN, None, &["[HEAD1]", "[HEAD2]", "[COUNT]", "[OUTPUT]"])?;
        let op1 = u64::try_from(op1).map_err(|_| Error::Format(line.to_string()))?;
        let op2 = u64::try_from(op2).map_err(|_| Error::Format(line.to_string()))?;
        let mut machine = DivisionMachine::new(op1, op2)?;
        Ok(DivisionChecker { seq: machine.transition_seq(), step: 0 })
    }
}

impl Checker for DivisionChecker {
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
    fn test_full_replay_4513_over_1504() {
        let mut machine = DivisionMachine::new(4513, 1504).unwrap();
        let seq = machine.transition_seq();
        // Seed round, three loop passes of three rounds, exit round.
        assert_eq!(seq.len(), 11);
        assert_eq!(
            seq[0].0,
            "DIV, q0, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT] [OUTPUT]\n\
             CMD [COUNT]|4|0|5|1, [OUTPUT] 0, q1\n"
        );
        assert_eq!(
            seq[0].1,
            "DIV, q1, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT]|4|0|5|1 [OUTPUT]|0\n\
             CMD [CALL] GREATER_THAN, q2\n\
             GREATER_THAN, q0, [HEAD1] |4|0|5|1[HEAD2] |3|1|5|4 [OUTPUT]\n\
             CMD [HEAD1] RIGHT, [HEAD2] RIGHT, [OUTPUT] False, q1"
        );
        assert_eq!(
            seq[1].0,
            "DIV, q1, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT]|4|0|5|1 [OUTPUT]|0\n\
             CMD [CALL] GREATER_THAN, q2\n\
             GREATER_THAN, qH,  |4|0|5|1[HEAD1] |3|1|5|4[HEAD2] False\n\
             No command to execute. Halt state.\n"
        );
        assert_eq!(
            seq[1].1,
            "DIV, q2, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT]|4|0|5|1 [OUTPUT]|0\n\
             CMD [CALL] ADD, q3\n\
             ADD, q0, [HEAD1] |0[HEAD2] |1 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1"
        );
        assert_eq!(
            seq[2].1,
            "DIV, q3, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT]|4|0|5|1 [OUTPUT]|1\n\
             CMD [CALL] ADD, q1\n\
             ADD, q0, [HEAD1] |4|0|5|1[HEAD2] |4|0|5|1 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1"
        );
        // Exit round: counter 6016 overshoots 4513.
        assert_eq!(
            seq[10].0,
            "DIV, q1, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT]|6|1|0|6 [OUTPUT]|3\n\
             CMD [CALL] GREATER_THAN, q2\n\
             GREATER_THAN, qH,  |6|1|0|6[HEAD1] |3|1|5|4[HEAD2] True\n\
             No command to execute. Halt state.\n"
        );
        assert_eq!(
            seq[10].1,
            "DIV, qH, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT]|6|1|0|6 |3\n\
             No command to execute. Halt state."
        );
        assert_eq!(machine.result(), 3);
    }

    #[test]
    fn test_division_by_zero_is_a_construction_error() {
        assert!(matches!(DivisionMachine::new(5, 0), Err(Error::DivByZero)));
    }

    #[test]
    fn test_boundary_blocks_report_overshot_counter() {
        let machine = DivisionMachine::new(4513, 1504).unwrap();
        let (input, output) = machine.boundary_blocks();
        assert_eq!(
            input,
            "DIV, q0, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT] [OUTPUT]\n\
             CMD [COUNT]|4|0|5|1, [OUTPUT] 0, q1\n"
        );
        assert_eq!(
            output,
            "DIV, qH, [HEAD1]|3|1|5|4 [HEAD2]|4|0|5|1 [COUNT]|6|1|0|6 |3\n\
             No command to execute. Halt state."
        );
    }

    #[test]
    fn test_dividend_smaller_than_divisor() {
        let mut machine = DivisionMachine::new(3, 7).unwrap();
        let seq = machine.transition_seq();
        assert_eq!(seq.len(), 2);
        assert!(seq[1].1.contains("DIV, qH, [HEAD1]|3 [HEAD2]|7 [COUNT]|7 |0"));
        assert_eq!(machine.result(), 0);
    }

    #[test]
    fn test_checker_replays_and_rejects() {
        let mut machine = DivisionMachine::new(4513, 1504).unwrap();
        let seq = machine.transition_seq();
        let mut checker = DivisionChecker::new(&seq[0].0).unwrap();
        for (_, output) in &seq {
            assert!(checker.check(output));
            checker.advance();
        }
        assert!(!checker.check(&seq[10].1));
        let checker = DivisionChecker::new(&seq[0].0).unwrap();
        assert!(!checker.check(&seq[1].1));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn halt_block_carries_quotient(a in 0u64..5_000, b in 1u64..100) {
            let mut machine = DivisionMachine::new(a, b).unwrap();
            let seq = machine.transition_seq();
            let halt = seq.last().unwrap().1.lines().next().unwrap().to_string();
            let expected = format!(" {}", tape::render(&tape::encode((a / b) as u128)));
            prop_assert!(halt.ends_with(&expected));
        }
    }
}
