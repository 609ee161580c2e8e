//! Machine and checker contracts plus the structured command grammar.
//!
//! A machine owns its operand tapes, registers, and state enumeration, and
//! renders two lines per step: the state line and the command line. Commands
//! are built from [`Action`] values and rendered by one canonical renderer,
//! so the side effects applied by `step` and the text describing them can
//! never diverge.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Literal command line of every halted machine.
pub const HALT_MESSAGE: &str = "No command to execute. Halt state.";

/// Machine state names. Each machine uses the subset its transition graph
/// needs; `Q0` is always initial and `QH` always terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Q0,
    Q1,
    Q2,
    Q3,
    Q4,
    QH,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Q0 => "q0",
            State::Q1 => "q1",
            State::Q2 => "q2",
            State::Q3 => "q3",
            State::Q4 => "q4",
            State::QH => "qH",
        }
    }
}

/// A cursor that a command can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Head1,
    Head2,
    /// The single head of one-operand machines.
    Head,
    Output,
}

impl Cursor {
    fn token(self) -> &'static str {
        match self {
            Cursor::Head1 => "[HEAD1]",
            Cursor::Head2 => "[HEAD2]",
            Cursor::Head => "[HEAD]",
            Cursor::Output => "[OUTPUT]",
        }
    }
}

/// A register that a command can write or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Carry,
    Count,
    Output,
}

impl Register {
    fn token(self) -> &'static str {
        match self {
            Register::Carry => "[C]",
            Register::Count => "[COUNT]",
            Register::Output => "[OUTPUT]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    fn token(self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

/// One side effect of a machine step.
///
/// Scalar writes separate token and value with a space (`[COUNT] 1`); tape
/// writes glue a rendered tape to the token (`[OUTPUT]|4|1|8|4|4`); a clear
/// is the bare token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move(Cursor, Direction),
    Write(Register, String),
    WriteTape(Register, String),
    Clear(Register),
    Call(&'static str),
}

impl Action {
    fn render(&self, out: &mut String) {
        match self {
            Action::Move(cursor, dir) => {
                out.push_str(cursor.token());
                out.push(' ');
                out.push_str(dir.token());
            }
            Action::Write(reg, value) => {
                out.push_str(reg.token());
                out.push(' ');
                out.push_str(value);
            }
            Action::WriteTape(reg, tape) => {
                out.push_str(reg.token());
                out.push_str(tape);
            }
            Action::Clear(reg) => out.push_str(reg.token()),
            Action::Call(op) => {
                out.push_str("[CALL] ");
                out.push_str(op);
            }
        }
    }
}

/// A full command line: `CMD` (or `CMD:`), the actions, and the next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    colon: bool,
    actions: Vec<Action>,
    next: &'static str,
}

impl Command {
    pub fn new(actions: Vec<Action>, next: &'static str) -> Self {
        Command { colon: false, actions, next }
    }

    /// Variant with a colon after `CMD`, used by the addition grammar.
    pub fn with_colon(actions: Vec<Action>, next: &'static str) -> Self {
        Command { colon: true, actions, next }
    }

    pub fn render(&self) -> String {
        let mut out = String::from(if self.colon { "CMD: " } else { "CMD " });
        for action in &self.actions {
            action.render(&mut out);
            out.push_str(", ");
        }
        out.push_str(self.next);
        out
    }
}

/// A deterministic tape machine that renders its state and command at every
/// step.
pub trait Machine {
    /// Canonical rendering of the current state.
    fn state_line(&self) -> String;

    /// Canonical rendering of the command about to execute, or the halt
    /// message at `qH`.
    fn command_line(&self) -> String;

    /// Apply exactly one transition.
    fn step(&mut self);

    fn halted(&self) -> bool;

    /// Drive to halt, recording every (state, command) pair including the
    /// final halted rendering.
    fn transitions(&mut self) -> Vec<(String, String)> {
        let mut seq = Vec::new();
        while !self.halted() {
            seq.push((self.state_line(), self.command_line()));
            self.step();
        }
        seq.push((self.state_line(), self.command_line()));
        seq
    }
}

/// Lockstep validator for externally produced candidate steps.
pub trait Checker {
    /// Byte-exact comparison of a candidate block against the expected next
    /// step. A structurally malformed candidate fails; it never panics.
    fn check(&self, candidate: &str) -> bool;

    /// Move the reference forward after the caller confirms a match. A no-op
    /// once the reference has halted.
    fn advance(&mut self);
}

// Matches the "<OP>, <state>," span of a state line. The operand fields never
// contain commas, so the greedy group runs to the comma after the state name.
static STATE_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z_]+), (.+),").expect("static pattern"));

/// Strip a state line down to its operand digit fields.
///
/// Removes the `<OP>, <state>,` head, then every token in `strip`, then the
/// digit separators. With `cut_at` the line is first truncated at that token
/// (the addition grammar cuts at `[C]` so carry and output never reach the
/// operand parse).
fn operand_fields(
    line: &str,
    op_token: &str,
    cut_at: Option<&str>,
    strip: &[&str],
) -> Result<String> {
    let err = || Error::Format(line.to_string());
    let region = match cut_at {
        Some(tag) => match line.find(tag) {
            Some(at) => &line[..at],
            None => line.get(..line.len().saturating_sub(1)).unwrap_or(line),
        },
        None => line,
    };
    let caps = STATE_HEAD.captures(region).ok_or_else(err)?;
    if &caps[1] != op_token {
        return Err(err());
    }
    let mut cleaned = region.replacen(caps.get(0).map_or("", |m| m.as_str()), "", 1);
    for token in strip {
        cleaned = cleaned.replace(token, "");
    }
    cleaned.retain(|c| c != crate::tape::SEPARATOR);
    Ok(cleaned.trim().to_string())
}

/// Parse the two operand values out of a state line.
pub(crate) fn parse_pair(
    line: &str,
    op_token: &str,
    cut_at: Option<&str>,
    strip: &[&str],
) -> Result<(u128, u128)> {
    let err = || Error::Format(line.to_string());
    let fields = operand_fields(line, op_token, cut_at, strip)?;
    let split = fields.find(' ').ok_or_else(err)?;
    let op1 = crate::tape::decode(&fields[..split]).ok_or_else(err)?;
    let op2 = crate::tape::decode(&fields[split + 1..]).ok_or_else(err)?;
    Ok((op1, op2))
}

/// Parse the leading operand fields of any state line, mid-trace included.
///
/// The line is truncated at its first register token, head tokens and
/// separators are stripped, and the first `count` whitespace-delimited fields
/// are decoded. Head splits collapse when the tokens vanish, so every state
/// of a trace yields the same operands.
pub(crate) fn parse_operands(line: &str, op_token: &str, count: usize) -> Result<Vec<u128>> {
    let err = || Error::Format(line.to_string());
    let cut = ["[C]", "[COUNT]", "[OUTPUT]"]
        .iter()
        .filter_map(|t| line.find(t))
        .min()
        .unwrap_or(line.len());
    let region = &line[..cut];
    let caps = STATE_HEAD.captures(region).ok_or_else(err)?;
    if &caps[1] != op_token {
        return Err(err());
    }
    let mut cleaned = region.replacen(caps.get(0).map_or("", |m| m.as_str()), "", 1);
    for token in ["[HEAD1]", "[HEAD2]", "[HEAD]"] {
        cleaned = cleaned.replace(token, "");
    }
    cleaned.retain(|c| c != crate::tape::SEPARATOR);
    let mut values = Vec::with_capacity(count);
    for field in cleaned.split_whitespace().take(count) {
        values.push(crate::tape::decode(field).ok_or_else(err)?);
    }
    if values.len() < count {
        return Err(err());
    }
    Ok(values)
}

/// Parse the single operand of a one-tape state line.
pub(crate) fn parse_single(line: &str, op_token: &str, strip: &[&str]) -> Result<u128> {
    let fields = operand_fields(line, op_token, None, strip)?;
    crate::tape::decode(&fields).ok_or_else(|| Error::Format(line.to_string()))
}

/// Assemble a four-line call block and strip it as a whole, so interior
/// trailing spaces survive while empty tail lines vanish.
pub(crate) fn call_block(a: &str, b: &str, c: &str, d: &str) -> String {
    format!("{a}\n{b}\n{c}\n{d}\n").trim().to_string()
}

/// Split a candidate block into its state and command lines.
///
/// Leading and trailing whitespace around the block is ignored; a block
/// without two lines yields `None`.
pub(crate) fn candidate_lines(candidate: &str) -> Option<(&str, &str)> {
    let mut lines = candidate.trim().lines();
    let state = lines.next()?;
    let command = lines.next()?;
    Some((state, command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_render_plain() {
        let cmd = Command::new(
            vec![
                Action::Move(Cursor::Head1, Direction::Right),
                Action::Move(Cursor::Head2, Direction::Right),
                Action::Write(Register::Output, "True".to_string()),
            ],
            "q1",
        );
        assert_eq!(cmd.render(), "CMD [HEAD1] RIGHT, [HEAD2] RIGHT, [OUTPUT] True, q1");
    }

    #[test]
    fn test_command_render_colon_and_clear() {
        let cmd = Command::with_colon(
            vec![
                Action::Write(Register::Output, "1".to_string()),
                Action::Clear(Register::Output),
                Action::Clear(Register::Carry),
            ],
            "qH",
        );
        assert_eq!(cmd.render(), "CMD: [OUTPUT] 1, [OUTPUT], [C], qH");
    }

    #[test]
    fn test_command_render_tape_write_and_call() {
        let cmd = Command::new(
            vec![
                Action::WriteTape(Register::Count, "|4|0|5|1".to_string()),
                Action::Write(Register::Output, "0".to_string()),
            ],
            "q1",
        );
        assert_eq!(cmd.render(), "CMD [COUNT]|4|0|5|1, [OUTPUT] 0, q1");
        let call = Command::new(vec![Action::Call("REFLECTION")], "q2");
        assert_eq!(call.render(), "CMD [CALL] REFLECTION, q2");
    }

    #[test]
    fn test_command_render_bare_transition() {
        assert_eq!(Command::new(vec![], "q1").render(), "CMD q1");
    }

    #[test]
    fn test_parse_pair_from_initial_state() {
        let line = "EQUAL, q0, [HEAD1] |3|2|1[HEAD2] |3|2|1 [OUTPUT]";
        let parsed = parse_pair(line, "EQUAL", None, &["[HEAD1]", "[HEAD2]", "[OUTPUT]"]);
        assert_eq!(parsed.unwrap(), (123, 123));
    }

    #[test]
    fn test_parse_pair_cut_at_carry() {
        let line = "ADD, q0, [HEAD1] |5|4|3[HEAD2] |8|7|6 [C] [OUTPUT]";
        let parsed = parse_pair(line, "ADD", Some("[C]"), &["[HEAD1]", "[HEAD2]"]);
        assert_eq!(parsed.unwrap(), (345, 678));
    }

    #[test]
    fn test_parse_pair_mid_trace_state() {
        // Head splits vanish with the tokens, so a q1 line parses the same.
        let line = "ADD, q1,  |5[HEAD1]|4|3 |8[HEAD2]|7|6 [C]0 |3[OUTPUT]";
        let parsed = parse_pair(line, "ADD", Some("[C]"), &["[HEAD1]", "[HEAD2]"]);
        assert_eq!(parsed.unwrap(), (345, 678));
    }

    #[test]
    fn test_parse_pair_rejects_wrong_operator() {
        let line = "EQUAL, q0, [HEAD1] |3|2|1[HEAD2] |3|2|1 [OUTPUT]";
        assert!(parse_pair(line, "ADD", Some("[C]"), &["[HEAD1]", "[HEAD2]"]).is_err());
    }

    #[test]
    fn test_parse_operands_any_state() {
        let line = "LESS_THAN, q1,  |2[HEAD1]|8|1|7|4 |1[HEAD2]|1|9|3|8 [OUTPUT]False";
        assert_eq!(parse_operands(line, "LESS_THAN", 2).unwrap(), vec![47182, 83911]);
        // Halted comparisons drop the [OUTPUT] token; the verdict is ignored.
        let halted = "EQUAL, qH,  |3|2|1[HEAD1] |3|2|1[HEAD2] True";
        assert_eq!(parse_operands(halted, "EQUAL", 2).unwrap(), vec![123, 123]);
        // Register fields never reach the operand parse.
        let mul = "MUL, qH, [HEAD1]|3|1|5|4 [HEAD2]|3 [COUNT]|3 |9|3|5|3|1";
        assert_eq!(parse_operands(mul, "MUL", 2).unwrap(), vec![4513, 3]);
        assert!(parse_operands(mul, "DIV", 2).is_err());
    }

    #[test]
    fn test_parse_single_operand() {
        let line = "LEFT_MASK, q0, [HEAD] |3|0|1 [OUTPUT]";
        assert_eq!(parse_single(line, "LEFT_MASK", &["[HEAD]", "[OUTPUT]"]).unwrap(), 103);
    }

    #[test]
    fn test_candidate_lines() {
        assert_eq!(candidate_lines("a\nb\n"), Some(("a", "b")));
        assert_eq!(candidate_lines("  a\nb"), Some(("a", "b")));
        assert_eq!(candidate_lines("only one line"), None);
    }
}
