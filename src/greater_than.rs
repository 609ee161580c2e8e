//! Digit-serial greater-than comparison.
//!
//! The mirror image of less-than: the scan walks every digit pair, each
//! differing pair overwrites the output register, and the verdict written
//! last (the most significant difference) survives to halt. Exhausting the
//! first operand first forces `False`, exhausting the second first forces
//! `True`.

use crate::error::Result;
use crate::machine::{
    candidate_lines, parse_pair, Action, Checker, Command, Cursor, Direction, Machine, Register,
    State, HALT_MESSAGE,
};
use crate::tape;

pub const TOKEN: &str = "GREATER_THAN";

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
            Action::Write(Register::Output, "False".to_string()),
        ],
        State::Q1.name(),
    )
    .render()
}

/// Canonical halted state line, heads split at the shorter operand's length.
pub fn halt_state_line(op1: &str, op2: &str, verdict: &str) -> String {
    let at = op1.len().min(op2.len());
    let (l1, r1) = tape::render_split(op1, at);
    let (l2, r2) = tape::render_split(op2, at);
    format!("{TOKEN}, qH,  {l1}[HEAD1]{r1} {l2}[HEAD2]{r2} {verdict}")
}

enum Verdict {
    HaltKeep,
    HaltForced(&'static str),
    Step(Option<&'static str>),
}

pub struct GreaterThanMachine {
    op1: String,
    op2: String,
    head1: usize,
    head2: usize,
    verdict: &'static str,
    state: State,
}

impl GreaterThanMachine {
    pub fn new(op1: u128, op2: u128) -> Self {
        GreaterThanMachine {
            op1: tape::encode(op1),
            op2: tape::encode(op2),
            head1: 0,
            head2: 0,
            verdict: "False",
            state: State::Q0,
        }
    }

    fn q1_verdict(&self) -> Verdict {
        if self.head1 == self.op1.len() && self.head2 == self.op2.len() {
            Verdict::HaltKeep
        } else if self.head1 >= self.op1.len() {
            Verdict::HaltForced("False")
        } else if self.head2 >= self.op2.len() {
            Verdict::HaltForced("True")
        } else {
            let a = tape::digit_or_zero(&self.op1, self.head1);
            let b = tape::digit_or_zero(&self.op2, self.head2);
            if a == b {
                Verdict::Step(None)
            } else if a > b {
                Verdict::Step(Some("True"))
            } else {
                Verdict::Step(Some("False"))
            }
        }
    }
}

impl Machine for GreaterThanMachine {
    fn state_line(&self) -> String {
        match self.state {
            State::Q0 => init_state_line(&self.op1, &self.op2),
            State::Q1 => {
                let (l1, r1) = tape::render_split(&self.op1, self.head1);
                let (l2, r2) = tape::render_split(&self.op2, self.head2);
                format!(
                    "{TOKEN}, q1,  {l1}[HEAD1]{r1} {l2}[HEAD2]{r2} [OUTPUT]{}",
                    self.verdict
                )
            }
            _ => halt_state_line(&self.op1, &self.op2, self.verdict),
        }
    }

    fn command_line(&self) -> String {
        match self.state {
            State::Q0 => init_command_line(),
            State::Q1 => match self.q1_verdict() {
                Verdict::HaltKeep => {
                    Command::new(vec![Action::Clear(Register::Output)], State::QH.name()).render()
                }
                Verdict::HaltForced(v) => Command::new(
                    vec![
                        Action::Write(Register::Output, v.to_string()),
                        Action::Clear(Register::Output),
                    ],
                    State::QH.name(),
                )
                .render(),
                Verdict::Step(act) => {
                    let mut actions = vec![
                        Action::Move(Cursor::Head1, Direction::Right),
                        Action::Move(Cursor::Head2, Direction::Right),
                    ];
                    if let Some(v) = act {
                        actions.push(Action::Write(Register::Output, v.to_string()));
                    }
                    Command::new(actions, State::Q1.name()).render()
                }
            },
            _ => HALT_MESSAGE.to_string(),
        }
    }

    fn step(&mut self) {
        match self.state {
            State::Q0 => self.state = State::Q1,
            State::Q1 => match self.q1_verdict() {
                Verdict::HaltKeep => self.state = State::QH,
                Verdict::HaltForced(v) => {
                    self.verdict = v;
                    self.state = State::QH;
                }
                Verdict::Step(act) => {
                    if let Some(v) = act {
                        self.verdict = v;
                    }
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

pub struct GreaterThanChecker {
    reference: GreaterThanMachine,
}

impl GreaterThanChecker {
    pub fn new(init: &str) -> Result<Self> {
        let line = init.trim().lines().next().unwrap_or_default();
        let (op1, op2) = parse_pair(line, TOKEN, None, &["[HEAD1]", "[HEAD2]", "[OUTPUT]"])?;
        let mut reference = GreaterThanMachine::new(op1, op2);
        reference.step();
        Ok(GreaterThanChecker { reference })
    }
}

impl Checker for GreaterThanChecker {
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
