//! Digit-serial addition machine.
//!
//! Reads one digit from each operand per step (0 once an operand is
//! exhausted), emits `sum mod 10`, and threads the carry through the `[C]`
//! register. Two rendering quirks are part of the trace grammar: the halting
//! command prints the final digit even when a zero value suppresses the
//! append, and the halted state shows the carry register as it was before
//! the final step.

use crate::error::Result;
use crate::machine::{
    candidate_lines, parse_pair, Action, Checker, Command, Cursor, Direction, Machine, Register,
    State, HALT_MESSAGE,
};
use crate::tape;

pub const TOKEN: &str = "ADD";

/// Canonical `q0` state line for two operand tapes.
pub fn init_state_line(op1: &str, op2: &str) -> String {
    format!(
        "{TOKEN}, q0, [HEAD1] {}[HEAD2] {} [C] [OUTPUT]",
        tape::render(op1),
        tape::render(op2)
    )
}

/// Canonical `q0` command line.
pub fn init_command_line() -> String {
    Command::with_colon(
        vec![
            Action::Write(Register::Carry, "0".to_string()),
            Action::Move(Cursor::Head1, Direction::Right),
            Action::Move(Cursor::Head2, Direction::Right),
        ],
        State::Q1.name(),
    )
    .render()
}

/// Canonical halted state line for the given tapes, carry, and output.
pub fn halt_state_line(op1: &str, op2: &str, carry: u32, output: &str) -> String {
    format!(
        "{TOKEN}, qH,  {}[HEAD1] {}[HEAD2] [C]{carry} {}",
        tape::render(op1),
        tape::render(op2),
        tape::render(output)
    )
}

pub struct AdditionMachine {
    op1: String,
    op2: String,
    head1: usize,
    head2: usize,
    carry: u32,
    output: String,
    state: State,
}

impl AdditionMachine {
    pub fn new(op1: u128, op2: u128) -> Self {
        AdditionMachine {
            op1: tape::encode(op1),
            op2: tape::encode(op2),
            head1: 0,
            head2: 0,
            carry: 0,
            output: String::new(),
            state: State::Q0,
        }
    }

    fn digit_sum(&self) -> u32 {
        tape::digit_or_zero(&self.op1, self.head1)
            + tape::digit_or_zero(&self.op2, self.head2)
            + self.carry
    }

    fn exhausted(&self) -> bool {
        self.head1 >= self.op1.len() && self.head2 >= self.op2.len()
    }
}

impl Machine for AdditionMachine {
    fn state_line(&self) -> String {
        match self.state {
            State::Q0 => init_state_line(&self.op1, &self.op2),
            State::Q1 => {
                let (l1, r1) = tape::render_split(&self.op1, self.head1);
                let (l2, r2) = tape::render_split(&self.op2, self.head2);
                format!(
                    "{TOKEN}, q1,  {l1}[HEAD1]{r1} {l2}[HEAD2]{r2} [C]{} {}[OUTPUT]",
                    self.carry,
                    tape::render(&self.output)
                )
            }
            _ => halt_state_line(&self.op1, &self.op2, self.carry, &self.output),
        }
    }

    fn command_line(&self) -> String {
        match self.state {
            State::Q0 => init_command_line(),
            State::Q1 => {
                let sum = self.digit_sum();
                if self.exhausted() {
                    Command::with_colon(
                        vec![
                            Action::Write(Register::Output, (sum % 10).to_string()),
                            Action::Clear(Register::Output),
                            Action::Clear(Register::Carry),
                        ],
                        State::QH.name(),
                    )
                    .render()
                } else {
                    let mut actions = vec![
                        Action::Write(Register::Carry, (sum / 10).to_string()),
                        Action::Write(Register::Output, (sum % 10).to_string()),
                        Action::Move(Cursor::Output, Direction::Right),
                    ];
                    if self.head1 < self.op1.len() {
                        actions.push(Action::Move(Cursor::Head1, Direction::Right));
                    }
                    if self.head2 < self.op2.len() {
                        actions.push(Action::Move(Cursor::Head2, Direction::Right));
                    }
                    Command::with_colon(actions, State::Q1.name()).render()
                }
            }
            _ => HALT_MESSAGE.to_string(),
        }
    }

    fn step(&mut self) {
        match self.state {
            State::Q0 => {
                self.carry = 0;
                self.state = State::Q1;
            }
            State::Q1 => {
                let sum = self.digit_sum();
                if self.exhausted() {
                    // The carry register keeps its pre-final value at halt.
                    if sum > 0 {
                        self.output.push((b'0' + (sum % 10) as u8) as char);
                    }
                    self.state = State::QH;
                } else {
                    self.output.push((b'0' + (sum % 10) as u8) as char);
                    self.carry = sum / 10;
                    self.head1 += 1;
                    self.head2 += 1;
                }
            }
            _ => {}
        }
    }

    fn halted(&self) -> bool {
        self.state == State::QH
    }
}

pub struct AdditionChecker {
    reference: AdditionMachine,
}

impl AdditionChecker {
    /// Build the lockstep reference from an initial context block, advanced
    /// one step past `q0` so checks start at the first candidate step.
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let (op1, op2) = parse_pair(line, TOKEN, Some("[C]"), &["[HEAD1]", "[HEAD2]"])?;
        let mut reference = AdditionMachine::new(op1, op2);
        reference.step();
        Ok(AdditionChecker { reference })
    }
}

impl Checker for AdditionChecker {
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
        fn addition_halts_with_sum(a in 0u64..=u64::MAX, b in 0u64..=u64::MAX) {
            let mut machine = AdditionMachine::new(a as u128, b as u128);
            machine.transitions();
            prop_assert_eq!(tape::decode(&machine.output), Some(a as u128 + b as u128));
        }

        #[test]
        fn trace_is_checkable_end_to_end(a in 0u64..100_000, b in 0u64..100_000) {
            let mut machine = AdditionMachine::new(a as u128, b as u128);
            let seq = machine.transitions();
            let init = format!("{}\n{}\n", seq[0].0, seq[0].1);
            let mut checker = AdditionChecker::new(&init).unwrap();
            for (state, command) in &seq[1..] {
                let candidate = format!("{state}\n{command}");
                prop_assert!(checker.check(&candidate));
                checker.advance();
            }
        }
    }
}
