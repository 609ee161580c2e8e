//! Left-mask: drop the most significant digit of a number.
//!
//! The single head copies the operand tape onto the output, then the machine
//! enters a trim phase. The step into `q2` removes the last copied digit
//! (the most significant one) and the trim keeps removing digits while they
//! are zero, so the surviving output has no high-order zeros. Unlike the
//! reflection trim this one is physical: the digits leave the tape. An
//! output trimmed to nothing halts as a bare `0` with no separator.

use crate::error::Result;
use crate::machine::{
    candidate_lines, parse_single, Action, Checker, Command, Cursor, Direction, Machine, Register,
    State, HALT_MESSAGE,
};
use crate::tape;

pub const TOKEN: &str = "LEFT_MASK";

/// Canonical `q0` state line.
pub fn init_state_line(op: &str) -> String {
    format!("{TOKEN}, q0, [HEAD] {} [OUTPUT]", tape::render(op))
}

/// Canonical `q0` command line.
pub fn init_command_line() -> String {
    Command::new(vec![Action::Move(Cursor::Head, Direction::Right)], State::Q1.name()).render()
}

/// Canonical halted state line. An empty output field renders as a bare `0`
/// without a separator.
pub fn halt_state_line(op: &str, output: &str) -> String {
    let output = if output.is_empty() {
        "0".to_string()
    } else {
        tape::render(output)
    };
    format!("{TOKEN}, qH,  {}[HEAD] {output}", tape::render(op))
}

pub struct LeftMaskMachine {
    op: String,
    head: usize,
    output: String,
    state: State,
}

impl LeftMaskMachine {
    pub fn new(op: u128) -> Self {
        LeftMaskMachine {
            op: tape::encode(op),
            head: 0,
            output: String::new(),
            state: State::Q0,
        }
    }

    /// Output value after masking and trimming.
    pub fn result(&self) -> u128 {
        tape::decode(&self.output).unwrap_or(0)
    }

    fn trim_next(&self) -> State {
        match self.output.as_bytes().last() {
            None => State::QH,
            Some(b'0') => State::Q2,
            Some(_) => State::QH,
        }
    }
}

impl Machine for LeftMaskMachine {
    fn state_line(&self) -> String {
        match self.state {
            State::Q0 => init_state_line(&self.op),
            State::Q1 => {
                let (l, r) = tape::render_split(&self.op, self.head);
                format!("{TOKEN}, q1,  {l}[HEAD]{r} {}[OUTPUT]", tape::render(&self.output))
            }
            State::Q2 => format!(
                "{TOKEN}, q2,  {}[HEAD] {}[OUTPUT]",
                tape::render(&self.op),
                tape::render(&self.output)
            ),
            _ => halt_state_line(&self.op, &self.output),
        }
    }

    fn command_line(&self) -> String {
        match self.state {
            State::Q0 => init_command_line(),
            State::Q1 => {
                if self.head >= self.op.len() {
                    Command::new(
                        vec![
                            Action::Move(Cursor::Output, Direction::Left),
                            Action::Write(Register::Output, "0".to_string()),
                        ],
                        State::Q2.name(),
                    )
                    .render()
                } else {
                    Command::new(
                        vec![
                            Action::Move(Cursor::Head, Direction::Right),
                            Action::Write(
                                Register::Output,
                                tape::digit_or_zero(&self.op, self.head).to_string(),
                            ),
                            Action::Move(Cursor::Output, Direction::Right),
                        ],
                        State::Q1.name(),
                    )
                    .render()
                }
            }
            State::Q2 => match self.trim_next() {
                State::Q2 => Command::new(
                    vec![Action::Move(Cursor::Output, Direction::Left)],
                    State::Q2.name(),
                )
                .render(),
                _ => Command::new(vec![], State::QH.name()).render(),
            },
            _ => HALT_MESSAGE.to_string(),
        }
    }

    fn step(&mut self) {
        match self.state {
            State::Q0 => self.state = State::Q1,
            State::Q1 => {
                if self.head >= self.op.len() {
                    self.output.pop();
                    self.state = State::Q2;
                } else {
                    let d = self.op.as_bytes()[self.head];
                    self.output.push(d as char);
                    self.head += 1;
                }
            }
            State::Q2 => match self.trim_next() {
                State::Q2 => {
                    self.output.pop();
                }
                _ => self.state = State::QH,
            },
            _ => {}
        }
    }

    fn halted(&self) -> bool {
        self.state == State::QH
    }
}

pub struct LeftMaskChecker {
    reference: LeftMaskMachine,
}

impl LeftMaskChecker {
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let op = parse_single(line, TOKEN, &["[HEAD]", "[OUTPUT]"])?;
        let mut reference = LeftMaskMachine::new(op);
        reference.step();
        Ok(LeftMaskChecker { reference })
    }
}

impl Checker for LeftMaskChecker {
    fn check(&self, candidate: &str) -> bool {
        match candidate_lines(candidate) {
            Some((state, command)) => {
                state == self.reference.state_line() && command == self.reference.command_line()
            }
            None => false,
        }
    }

    fn advance(&mut self) {
        if !self.reference.halted() {
            self.reference.step();
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn mask_drops_most_significant_digit(op in 0u64..=u64::MAX) {
            let mut machine = LeftMaskMachine::new(op as u128);
            machine.transitions();
            let digits = op.to_string();
            let expected: u128 = digits[1..].parse().unwrap_or(0);
            prop_assert_eq!(machine.result(), expected);
        }
    }
}
