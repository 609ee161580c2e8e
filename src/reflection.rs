//! Nines-complement reflection.
//!
//! The first operand is a run of nines (the base); the machine emits
//! `9 - d` for every digit of the second operand, padding with 9 once it is
//! exhausted, then enters a trim phase (`q2`) that walks the output cursor
//! left past high-order zeros. The trim is cursor-logical: the digits stay
//! on the tape, only the rendered span shrinks. An output trimmed to nothing
//! halts as `|0`.

use crate::error::{Error, Result};
use crate::machine::{
    candidate_lines, parse_pair, Action, Checker, Command, Cursor, Direction, Machine, Register,
    State, HALT_MESSAGE,
};
use crate::tape;

pub const TOKEN: &str = "REFLECTION";

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
        ],
        State::Q1.name(),
    )
    .render()
}

/// Canonical halted state line. An empty output field renders as the digit
/// zero, separator included.
pub fn halt_state_line(op1: &str, op2: &str, output: &str) -> String {
    let output = if output.is_empty() { "0" } else { output };
    format!(
        "{TOKEN}, qH,  {}[HEAD1] {}[HEAD2] {}",
        tape::render(op1),
        tape::render(op2),
        tape::render(output)
    )
}

pub struct ReflectionMachine {
    op1: String,
    op2: String,
    head1: usize,
    head2: usize,
    output: String,
    /// Rendered span of the output during and after the trim phase.
    out_len: usize,
    state: State,
}

impl ReflectionMachine {
    pub fn new(op1: u128, op2: u128) -> Result<Self> {
        if !op1.to_string().bytes().all(|b| b == b'9') {
            return Err(Error::BadReflectionBase(op1));
        }
        if op2 > op1 {
            return Err(Error::ReflectionOverflow { op1, op2 });
        }
        Ok(ReflectionMachine {
            op1: tape::encode(op1),
            op2: tape::encode(op2),
            head1: 0,
            head2: 0,
            output: String::new(),
            out_len: 0,
            state: State::Q0,
        })
    }

    /// Output value after trimming, i.e. `op1 - op2`.
    pub fn result(&self) -> u128 {
        tape::decode(&self.output[..self.out_len]).unwrap_or(0)
    }

    fn copy_done(&self) -> bool {
        self.head1 >= self.op1.len() && self.head2 >= self.op2.len()
    }

    fn reflected_digit(&self) -> u32 {
        9 - tape::digit_or_zero(&self.op2, self.head2)
    }

    fn trim_next(&self) -> State {
        if self.out_len == 0 || self.output.as_bytes()[self.out_len - 1] != b'0' {
            State::QH
        } else {
            State::Q2
        }
    }
}

impl Machine for ReflectionMachine {
    fn state_line(&self) -> String {
        match self.state {
            State::Q0 => init_state_line(&self.op1, &self.op2),
            State::Q1 => {
                let (l1, r1) = tape::render_split(&self.op1, self.head1);
                let (l2, r2) = tape::render_split(&self.op2, self.head2);
                format!(
                    "{TOKEN}, q1,  {l1}[HEAD1]{r1} {l2}[HEAD2]{r2} {}[OUTPUT]",
                    tape::render(&self.output)
                )
            }
            State::Q2 => format!(
                "{TOKEN}, q2,  {}[HEAD1] {}[HEAD2] {}[OUTPUT]",
                tape::render(&self.op1),
                tape::render(&self.op2),
                tape::render(&self.output[..self.out_len])
            ),
            _ => halt_state_line(&self.op1, &self.op2, &self.output[..self.out_len]),
        }
    }

    fn command_line(&self) -> String {
        match self.state {
            State::Q0 => init_command_line(),
            State::Q1 => {
                if self.copy_done() {
                    Command::new(vec![], State::Q2.name()).render()
                } else {
                    let mut actions = Vec::new();
                    if self.head1 < self.op1.len() {
                        actions.push(Action::Move(Cursor::Head1, Direction::Right));
                    }
                    if self.head2 < self.op2.len() {
                        actions.push(Action::Move(Cursor::Head2, Direction::Right));
                    }
                    actions.push(Action::Write(Register::Output, self.reflected_digit().to_string()));
                    actions.push(Action::Move(Cursor::Output, Direction::Right));
                    Command::new(actions, State::Q1.name()).render()
                }
            }
            State::Q2 => match self.trim_next() {
                State::Q2 => Command::new(
                    vec![Action::Move(Cursor::Output, Direction::Left)],
                    State::Q2.name(),
                )
                .render(),
                _ => Command::new(vec![Action::Clear(Register::Output)], State::QH.name()).render(),
            },
            _ => HALT_MESSAGE.to_string(),
        }
    }

    fn step(&mut self) {
        match self.state {
            State::Q0 => self.state = State::Q1,
            State::Q1 => {
                if self.copy_done() {
                    self.out_len = self.output.len();
                    self.state = State::Q2;
                } else {
                    let y = self.reflected_digit();
                    self.output.push((b'0' + y as u8) as char);
                    self.head1 += 1;
                    self.head2 += 1;
                }
            }
            State::Q2 => match self.trim_next() {
                State::Q2 => self.out_len -= 1,
                _ => self.state = State::QH,
            },
            _ => {}
        }
    }

    fn halted(&self) -> bool {
        self.state == State::QH
    }
}

pub struct ReflectionChecker {
    reference: ReflectionMachine,
}

impl ReflectionChecker {
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let (op1, op2) = parse_pair(line, TOKEN, None, &["[HEAD1]", "[HEAD2]", "[OUTPUT]"])?;
        let mut reference = ReflectionMachine::new(op1, op2)?;
        reference.step();
        Ok(ReflectionChecker { reference })
    }
}

impl Checker for ReflectionChecker {
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
        fn reflection_computes_base_minus_operand(width in 1u32..19, op2 in 0u64..u64::MAX) {
            let base = 10u128.pow(width) - 1;
            let op2 = (op2 as u128) % (base + 1);
            let mut machine = ReflectionMachine::new(base, op2).unwrap();
            machine.transitions();
            prop_assert_eq!(machine.result(), base - op2);
        }
    }
}
