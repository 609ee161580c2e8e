//! Digit-serial equality comparison.
//!
//! The output register starts at `True` and the machine halts on the first
//! evidence against equality: a mismatching digit pair, or one operand
//! running out of digits before the other. Only equal-length, all-equal
//! operands scan to the end.

use crate::error::Result;
use crate::machine::{
    candidate_lines, parse_pair, Action, Checker, Command, Cursor, Direction, Machine, Register,
    State, HALT_MESSAGE,
};
use crate::tape;

pub const TOKEN: &str = "EQUAL";

/// Canonical `q0` state line for two operand tapes.
pub fn init_state_line(op1: &str, op2: &str) -> String {
    format!(
        "{TOKEN}, q0, [HEAD1] {}[HEAD2] {} [OUTPUT]",
        tape::render(op1),
        tape::render(op2)
    )
}

/// Canonical `q0` command line.
pub fn init_command_line() -> String {
    Command::new(
        vec![
            Action::Move(Cursor::Head1, Direction::Right),
            Action::Move(Cursor::Head2, Direction::Right),
            Action::Write(Register::Output, "True".to_string()),
        ],
        State::Q1.name(),
    )
    .render()
}

pub struct EqualityMachine {
    op1: String,
    op2: String,
    head1: usize,
    head2: usize,
    verdict: &'static str,
    state: State,
}

enum Outcome {
    Continue,
    HaltEqual,
    HaltUnequal,
}

impl EqualityMachine {
    pub fn new(op1: u128, op2: u128) -> Self {
        EqualityMachine {
            op1: tape::encode(op1),
            op2: tape::encode(op2),
            head1: 0,
            head2: 0,
            verdict: "True",
            state: State::Q0,
        }
    }

    fn outcome(&self) -> Outcome {
        if self.head1 == self.op1.len() && self.head2 == self.op2.len() {
            Outcome::HaltEqual
        } else if self.head1 >= self.op1.len() || self.head2 >= self.op2.len() {
            Outcome::HaltUnequal
        } else if tape::digit_or_zero(&self.op1, self.head1)
            != tape::digit_or_zero(&self.op2, self.head2)
        {
            Outcome::HaltUnequal
        } else {
            Outcome::Continue
        }
    }

    fn split_fields(&self) -> (String, String, String, String) {
        let (l1, r1) = tape::render_split(&self.op1, self.head1);
        let (l2, r2) = tape::render_split(&self.op2, self.head2);
        (l1, r1, l2, r2)
    }
}

impl Machine for EqualityMachine {
    fn state_line(&self) -> String {
        match self.state {
            State::Q0 => init_state_line(&self.op1, &self.op2),
            State::Q1 => {
                let (l1, r1, l2, r2) = self.split_fields();
                format!(
                    "{TOKEN}, q1,  {l1}[HEAD1]{r1} {l2}[HEAD2]{r2} [OUTPUT]{}",
                    self.verdict
                )
            }
            _ => {
                let (l1, r1, l2, r2) = self.split_fields();
                format!(
                    "{TOKEN}, qH,  {l1}[HEAD1]{r1} {l2}[HEAD2]{r2} {}",
                    self.verdict
                )
            }
        }
    }

    fn command_line(&self) -> String {
        match self.state {
            State::Q0 => init_command_line(),
            State::Q1 => match self.outcome() {
                Outcome::HaltEqual => {
                    Command::new(vec![Action::Clear(Register::Output)], State::QH.name()).render()
                }
                Outcome::HaltUnequal => Command::new(
                    vec![
                        Action::Write(Register::Output, "False".to_string()),
                        Action::Clear(Register::Output),
                    ],
                    State::QH.name(),
                )
                .render(),
                Outcome::Continue => Command::new(
                    vec![
                        Action::Move(Cursor::Head1, Direction::Right),
                        Action::Move(Cursor::Head2, Direction::Right),
                    ],
                    State::Q1.name(),
                )
                .render(),
            },
            _ => HALT_MESSAGE.to_string(),
        }
    }

    fn step(&mut self) {
        match self.state {
            State::Q0 => self.state = State::Q1,
            State::Q1 => match self.outcome() {
                Outcome::HaltEqual => self.state = State::QH,
                Outcome::HaltUnequal => {
                    self.verdict = "False";
                    self.state = State::QH;
                }
                Outcome::Continue => {
                    self.head1 += 1;
                    self.head2 += 1;
                }
            },
            _ => {}
        }
    }

    fn halted(&self) -> bool {
        self.state == State::QH
    }
}

pub struct EqualityChecker {
    reference: EqualityMachine,
}

impl EqualityChecker {
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let (op1, op2) = parse_pair(line, TOKEN, None, &["[HEAD1]", "[HEAD2]", "[OUTPUT]"])?;
        let mut reference = EqualityMachine::new(op1, op2);
        reference.step();
        Ok(EqualityChecker { reference })
    }
}

impl Checker for EqualityChecker {
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
        fn verdict_matches_operand_equality(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let mut machine = EqualityMachine::new(a as u128, b as u128);
            machine.transitions();
            prop_assert_eq!(machine.verdict == "True", a == b);
        }
    }
}
