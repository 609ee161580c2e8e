//! Alignment between conventional arithmetic notation and tape renderings.
//!
//! `input_to_tm` turns `123+45=` into the exact text the matching machine
//! renders at `q0`; `tm_to_output` turns a halted state line back into
//! `123+45=168`. Translation delegates to the machines' own rendering
//! helpers, so the aligned text can never drift from the executed text.

use crate::error::{Error, Result};
use crate::registry::Op;
use crate::tape;
use crate::{
    addition, division, equality, greater_than, less_than, multiplication, subtraction,
};
use regex::Regex;
use std::sync::LazyLock;

// Anchored so the expression must open the text. Operands capture raw digit
// strings; leading zeros survive into the tape rendering.
static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*(\+|-|\*|//|>|<|==)\s*(\d+)\s*=").expect("static pattern")
});

/// Parse `<op1><operator><op2>=` into raw operand strings and the operation.
pub fn parse_expression(raw: &str) -> Result<(String, Op, String)> {
    let caps = EXPRESSION
        .captures(raw)
        .ok_or_else(|| Error::Format(raw.to_string()))?;
    let op = Op::from_symbol(&caps[2])?;
    Ok((caps[1].to_string(), op, caps[3].to_string()))
}

/// Translate a raw expression into the target machine's initial state and
/// first command, newline-joined with a trailing newline.
pub fn input_to_tm(raw: &str) -> Result<String> {
    let (op1, op, op2) = parse_expression(raw)?;
    let op1: String = op1.chars().rev().collect();
    let op2: String = op2.chars().rev().collect();
    let (state, command) = match op {
        Op::Add => (addition::init_state_line(&op1, &op2), addition::init_command_line()),
        Op::Sub => (subtraction::init_state_line(&op1, &op2), subtraction::init_command_line()),
        Op::Mul => {
            (multiplication::init_state_line(&op1, &op2), multiplication::init_command_line(&op1))
        }
        Op::Div => (division::init_state_line(&op1, &op2), division::init_command_line(&op2)),
        Op::Equal => (equality::init_state_line(&op1, &op2), equality::init_command_line()),
        Op::GreaterThan => {
            (greater_than::init_state_line(&op1, &op2), greater_than::init_command_line())
        }
        Op::LessThan => (less_than::init_state_line(&op1, &op2), less_than::init_command_line()),
        Op::Reflection | Op::LeftMask => return Err(Error::UnknownOp(op.task().to_string())),
    };
    Ok(format!("{state}\n{command}\n"))
}

/// Translate a halted state line into result notation.
///
/// The result is the trailing whitespace-delimited field, unrendered when
/// separator-joined. `operator` accepts either the notation symbol or the
/// task name. No correctness check happens here; the line's claim is
/// formatted as-is.
pub fn tm_to_output(halted: &str, op1: &str, op2: &str, operator: &str) -> Result<String> {
    let line = halted.trim();
    let at = line.rfind(' ').ok_or_else(|| Error::Format(halted.to_string()))?;
    let field = &line[at + 1..];
    let result = if field.contains(tape::SEPARATOR) {
        tape::unrender(field)
    } else {
        field.to_string()
    };
    let symbol = match Op::from_symbol(operator) {
        Ok(_) => operator.to_string(),
        Err(_) => {
            let op = Op::from_task(&operator.to_lowercase())?;
            op.symbol().ok_or_else(|| Error::UnknownOp(operator.to_string()))?.to_string()
        }
    };
    Ok(format!("{op1}{symbol}{op2}={result}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Machine;

    #[test]
    fn test_input_matches_machine_q0_for_every_symbol() {
        let aligned = input_to_tm("1504+2379=").unwrap();
        let machine = addition::AdditionMachine::new(1504, 2379);
        assert_eq!(aligned, format!("{}\n{}\n", machine.state_line(), machine.command_line()));
        assert_eq!(
            aligned,
            "ADD, q0, [HEAD1] |4|0|5|1[HEAD2] |9|7|3|2 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1\n"
        );

        assert_eq!(
            input_to_tm("4531-1504=").unwrap(),
            "SUB, q0, [HEAD1]|1|3|5|4 [HEAD2]|4|0|5|1 \nCMD q1\n"
        );
        assert_eq!(
            input_to_tm("44814*5=").unwrap(),
            "MUL, q0, [HEAD1]|4|1|8|4|4 [HEAD2]|5 [COUNT] [OUTPUT]\n\
             CMD [COUNT] 1, [OUTPUT]|4|1|8|4|4, q1\n"
        );
        assert_eq!(
            input_to_tm("4531//1504=").unwrap(),
            "DIV, q0, [HEAD1]|1|3|5|4 [HEAD2]|4|0|5|1 [COUNT] [OUTPUT]\n\
             CMD [COUNT]|4|0|5|1, [OUTPUT] 0, q1\n"
        );
        assert_eq!(
            input_to_tm("47182<83911=").unwrap(),
            "LESS_THAN, q0, [HEAD1] |2|8|1|7|4[HEAD2] |1|1|9|3|8 [OUTPUT]\n\
             CMD [HEAD1] RIGHT, [HEAD2] RIGHT, [OUTPUT] False, q1\n"
        );
        assert_eq!(
            input_to_tm("45263==45263=").unwrap(),
            "EQUAL, q0, [HEAD1] |3|6|2|5|4[HEAD2] |3|6|2|5|4 [OUTPUT]\n\
             CMD [HEAD1] RIGHT, [HEAD2] RIGHT, [OUTPUT] True, q1\n"
        );
        assert!(input_to_tm("12>3=").is_ok());
    }

    #[test]
    fn test_input_preserves_leading_zeros() {
        assert_eq!(
            input_to_tm("007+1=").unwrap(),
            "ADD, q0, [HEAD1] |7|0|0[HEAD2] |1 [C] [OUTPUT]\n\
             CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1\n"
        );
    }

    #[test]
    fn test_input_rejects_malformed_expressions() {
        assert!(input_to_tm("12%3=").is_err());
        assert!(input_to_tm("12+3").is_err());
        assert!(input_to_tm("x 12+3=").is_err());
        assert!(input_to_tm("").is_err());
    }

    #[test]
    fn test_output_unrenders_tape_results() {
        let halted = "SUB, qH, [HEAD1]|1|3|5|4 [HEAD2]|4|0|5|1 |7|2|0|3";
        assert_eq!(tm_to_output(halted, "4531", "1504", "-").unwrap(), "4531-1504=3027");
        // Task names translate back to their symbols.
        assert_eq!(tm_to_output(halted, "4531", "1504", "sub").unwrap(), "4531-1504=3027");
    }

    #[test]
    fn test_output_passes_verdicts_through() {
        let halted = "EQUAL, qH,  |3|6|2|5|4[HEAD1] |3|6|2|5|4[HEAD2] True";
        assert_eq!(
            tm_to_output(halted, "45263", "45263", "equal").unwrap(),
            "45263==45263=True"
        );
    }

    #[test]
    fn test_output_rejects_unknown_operator() {
        assert!(tm_to_output("SUB, qH, |1 |1 |0", "1", "1", "modulo").is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::registry;
    use proptest::prelude::*;

    proptest! {
        // The aligned init must be byte-identical to the machine's own q0
        // rendering for every notation operator.
        #[test]
        fn aligned_init_matches_q0(op1 in 0u64..=9999, op2 in 1u64..=9) {
            for symbol in registry::SYMBOLS {
                let op = Op::from_symbol(symbol).unwrap();
                let (a, b) = if op == Op::Sub && op1 < op2 { (op2, op1) } else { (op1, op2) };
                let aligned = input_to_tm(&format!("{a}{symbol}{b}=")).unwrap();
                let seq = registry::transitions_for(op, a, b).unwrap();
                let q0 = if op.is_composite() {
                    seq[0].0.clone()
                } else {
                    format!("{}\n{}", seq[0].0, seq[0].1)
                };
                prop_assert_eq!(aligned.trim_end(), q0.trim_end());
            }
        }
    }
}
