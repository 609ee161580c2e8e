//! Round-based batch execution over externally supplied candidate steps.
//!
//! The driver owns no generation: each round it hands the active contexts to
//! a [`CandidateSource`], validates every candidate against that item's
//! checker, and either adopts the candidate as the new context or records the
//! divergence and retires the item. Composite rounds additionally collect
//! CALL directives into per-round call frames and drain them through the
//! primitive driver, one nesting level deep.
//!
//! Per item, two flags: `correct` (never invalidated) and `finished` (halted
//! or invalidated). `!correct` implies `finished`; a mismatch is a terminal,
//! recorded outcome that never aborts sibling items.

use crate::aligner;
use crate::error::{Error, Result};
use crate::eval::extract_answer;
use crate::machine::{self, Machine, HALT_MESSAGE};
use crate::registry::{self, Op};
use crate::{addition, equality, greater_than, left_mask, less_than, reflection};
use regex::Regex;
use std::sync::LazyLock;

static CALL_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCMD\s\[CALL\]\s(.+),\s(.+)\b").expect("static pattern"));

/// External generation boundary.
///
/// `generate` receives a role (`<task>` or `<task>_aligner`) and one context
/// per active item, and must return one candidate per context, same order.
/// A candidate may echo its context; the driver strips it.
pub trait CandidateSource {
    fn generate(&mut self, role: &str, contexts: &[String]) -> Vec<String>;
}

/// One collected CALL directive: target operation and the callee's initial
/// two-line context.
struct CallFrame {
    op: Op,
    init: String,
}

fn check_stop(corrects: &[bool], finished: &[bool]) -> bool {
    !corrects.iter().any(|&c| c) || finished.iter().all(|&f| f)
}

fn mark_finished(batch: &[String], corrects: &[bool], finished: &mut [bool], marker: &str) {
    for i in 0..batch.len() {
        if corrects[i] && batch[i].contains(marker) {
            finished[i] = true;
        }
    }
}

/// Request candidates for the active sub-batch and scatter them back by
/// original index; inactive items echo their context.
fn scatter_generate(
    source: &mut dyn CandidateSource,
    role: &str,
    batch: &[String],
    corrects: &[bool],
    finished: &[bool],
) -> Vec<String> {
    let active: Vec<usize> =
        (0..batch.len()).filter(|&i| corrects[i] && !finished[i]).collect();
    let mut results: Vec<String> = batch.to_vec();
    if active.is_empty() {
        return results;
    }
    let contexts: Vec<String> = active.iter().map(|&i| batch[i].clone()).collect();
    let outputs = source.generate(role, &contexts);
    for (slot, &i) in active.iter().enumerate() {
        if let Some(output) = outputs.get(slot) {
            results[i] = output.clone();
        }
    }
    results
}

/// Drive a batch of primitive traces to halt.
///
/// `batch` holds each item's current context and is updated in place as
/// candidates are adopted. `parent_finished` merges a caller's finished
/// flags in, so nested runs skip slots the parent already settled. Returns
/// each item's final response: the halted block for survivors, context plus
/// the diverging candidate for failures.
pub fn run_primitive(
    source: &mut dyn CandidateSource,
    op: Op,
    batch: &mut [String],
    corrects: &mut [bool],
    parent_finished: Option<&[bool]>,
) -> Result<Vec<String>> {
    let len = batch.len();
    let mut finished: Vec<bool> = corrects.iter().map(|&c| !c).collect();
    if let Some(parent) = parent_finished {
        for (f, &p) in finished.iter_mut().zip(parent) {
            *f = *f || p;
        }
    }
    let mut checkers: Vec<Option<Box<dyn machine::Checker>>> = Vec::with_capacity(len);
    for i in 0..len {
        checkers.push(if corrects[i] && !finished[i] {
            Some(registry::checker_for(op, &batch[i])?)
        } else {
            None
        });
    }
    let mut results = vec![String::new(); len];

    while !check_stop(corrects, &finished) {
        let outputs = scatter_generate(source, op.task(), batch, corrects, &finished);
        for i in 0..len {
            if !corrects[i] || finished[i] {
                continue;
            }
            let response = extract_answer(&batch[i], &outputs[i]);
            results[i] = response.clone();
            match checkers[i].as_mut() {
                Some(checker) if checker.check(&response) => {
                    checker.advance();
                    batch[i] = response;
                }
                _ => {
                    results[i] = format!("{}\n{response}", batch[i]);
                    corrects[i] = false;
                    finished[i] = true;
                }
            }
        }
        mark_finished(batch, corrects, &mut finished, HALT_MESSAGE);
    }
    Ok(results)
}

/// Drive a batch of composite traces to halt, draining each round's call
/// frames through the primitive driver.
pub fn run_composite(
    source: &mut dyn CandidateSource,
    op: Op,
    batch: &mut [String],
    corrects: &mut [bool],
) -> Result<Vec<String>> {
    let len = batch.len();
    let mut accumulated = vec![String::new(); len];
    let mut finished: Vec<bool> = corrects.iter().map(|&c| !c).collect();
    let mut checkers: Vec<Option<Box<dyn machine::Checker>>> = Vec::with_capacity(len);
    for i in 0..len {
        checkers.push(if corrects[i] && !finished[i] {
            Some(registry::checker_for(op, &batch[i])?)
        } else {
            None
        });
    }
    let mut results = vec![String::new(); len];
    let marker = op.halt_marker();

    while !check_stop(corrects, &finished) {
        let outputs = scatter_generate(source, op.task(), batch, corrects, &finished);
        let mut frames: Vec<Option<CallFrame>> = (0..len).map(|_| None).collect();
        for i in 0..len {
            if !corrects[i] || finished[i] {
                continue;
            }
            let response = extract_answer(&batch[i], &outputs[i]);
            accumulated[i].push('\n');
            accumulated[i].push_str(&response);
            match checkers[i].as_mut() {
                Some(checker) if checker.check(&response) => checker.advance(),
                _ => {
                    results[i] = format!("{}\n{response}", batch[i]);
                    corrects[i] = false;
                    finished[i] = true;
                    continue;
                }
            }
            if let Some(caps) = CALL_DIRECTIVE.captures(&response) {
                let call_op = Op::from_task(&caps[1].to_lowercase())?;
                // A block that passed the checker has the callee's init on
                // lines 3-4; the context rewinds to the parent's two lines.
                let lines: Vec<&str> = response.split('\n').collect();
                if lines.len() < 4 {
                    return Err(Error::Format(response.clone()));
                }
                frames[i] = Some(CallFrame {
                    op: call_op,
                    init: format!("{}\n{}\n", lines[2], lines[3]),
                });
                batch[i] = format!("{}\n{}\n", lines[0], lines[1]);
            } else {
                batch[i] = response;
            }
        }
        mark_finished(batch, corrects, &mut finished, marker);

        // Drain this round's frames, grouped by target operation. Items in
        // other groups are gated out through the finished mask.
        let mut round_ops: Vec<Op> = Vec::new();
        for frame in frames.iter().flatten() {
            if !round_ops.contains(&frame.op) {
                round_ops.push(frame.op);
            }
        }
        for call_op in round_ops {
            let mut inits = vec![String::new(); len];
            let mut gate = vec![true; len];
            for i in 0..len {
                if let Some(frame) = &frames[i] {
                    if frame.op == call_op {
                        inits[i] = frame.init.clone();
                        gate[i] = finished[i];
                    }
                }
            }
            let call_responses = run_primitive(source, call_op, &mut inits, corrects, Some(&gate))?;
            for i in 0..len {
                batch[i].push_str(&call_responses[i]);
                if !corrects[i] {
                    finished[i] = true;
                    if !call_responses[i].is_empty() {
                        results[i] = call_responses[i].clone();
                    }
                }
            }
        }
    }

    for i in 0..len {
        if corrects[i] {
            // Second-to-last line of the accumulated trace: the halted
            // parent state line.
            let lines: Vec<&str> = accumulated[i].trim_end().split('\n').collect();
            if lines.len() >= 2 {
                results[i] = lines[lines.len() - 2].to_string();
            }
        }
    }
    Ok(results)
}

fn execute(
    source: &mut dyn CandidateSource,
    op: Op,
    batch: &mut [String],
    corrects: &mut [bool],
) -> Result<Vec<String>> {
    if op.is_composite() {
        run_composite(source, op, batch, corrects)
    } else {
        run_primitive(source, op, batch, corrects, None)
    }
}

/// Pre-alignment phase: each candidate must reproduce the aligner's own
/// translation of the raw expression.
fn pre_align(
    source: &mut dyn CandidateSource,
    op: Op,
    batch: &[String],
    corrects: &mut [bool],
) -> Result<Vec<String>> {
    let role = format!("{}_aligner", op.task());
    let finished: Vec<bool> = corrects.iter().map(|&c| !c).collect();
    let outputs = scatter_generate(source, &role, batch, corrects, &finished);
    let mut results = vec![String::new(); batch.len()];
    for i in 0..batch.len() {
        if !corrects[i] || finished[i] {
            continue;
        }
        let response = extract_answer(&batch[i], &outputs[i]);
        let ground = aligner::input_to_tm(&batch[i])?;
        if response.trim() != ground.trim() {
            corrects[i] = false;
            results[i] = format!("{}\n\n{response}", batch[i]);
        } else {
            results[i] = response;
        }
    }
    Ok(results)
}

/// Post-alignment phase: candidates are recorded without a ground-truth
/// comparison.
fn post_align(
    source: &mut dyn CandidateSource,
    op: Op,
    batch: &[String],
    corrects: &[bool],
) -> Vec<String> {
    let role = format!("{}_aligner", op.task());
    let finished: Vec<bool> = corrects.iter().map(|&c| !c).collect();
    let outputs = scatter_generate(source, &role, batch, corrects, &finished);
    let mut results = vec![String::new(); batch.len()];
    for i in 0..batch.len() {
        if !corrects[i] || finished[i] {
            continue;
        }
        results[i] = extract_answer(&batch[i], &outputs[i]);
    }
    results
}

/// Drive a batch end to end, optionally through the three-phase aligned
/// pipeline (pre-align, execute, post-align with fallback substitution).
pub fn run_execute(
    source: &mut dyn CandidateSource,
    op: Op,
    batch: Vec<String>,
    alignment: bool,
) -> Result<(Vec<String>, Vec<bool>)> {
    let mut corrects = vec![true; batch.len()];
    if alignment {
        let aligned = pre_align(source, op, &batch, &mut corrects)?;
        let mut contexts = aligned.clone();
        let mut executor_responses = execute(source, op, &mut contexts, &mut corrects)?;
        for i in 0..executor_responses.len() {
            if corrects[i] && !executor_responses[i].contains(HALT_MESSAGE) {
                executor_responses[i].push('\n');
                executor_responses[i].push_str(HALT_MESSAGE);
            }
        }
        let mut results = post_align(source, op, &executor_responses, &corrects);
        for i in 0..results.len() {
            if results[i].is_empty() {
                results[i] = executor_responses[i].clone();
            }
            if results[i].is_empty() {
                results[i] = aligned[i].clone();
            }
        }
        Ok((results, corrects))
    } else {
        let mut contexts = batch;
        let results = execute(source, op, &mut contexts, &mut corrects)?;
        Ok((results, corrects))
    }
}

/// Candidate source that replays reference machines, producing the canonical
/// continuation for any context. Drives every well-formed item to a correct
/// halt; a context it cannot interpret yields an empty candidate, which the
/// checker then rejects.
pub struct OracleSource;

impl CandidateSource for OracleSource {
    fn generate(&mut self, role: &str, contexts: &[String]) -> Vec<String> {
        contexts
            .iter()
            .map(|context| self.continue_one(role, context).unwrap_or_default())
            .collect()
    }
}

impl OracleSource {
    fn continue_one(&self, role: &str, context: &str) -> Result<String> {
        if let Some(task) = role.strip_suffix("_aligner") {
            return self.align(task, context);
        }
        let op = Op::from_task(role)?;
        let first = context
            .trim()
            .lines()
            .next()
            .ok_or_else(|| Error::Format(context.to_string()))?
            .to_string();
        if op.is_composite() {
            let ops = machine::parse_operands(&first, op.token(), 2)?;
            let op1 = u64::try_from(ops[0]).map_err(|_| Error::Format(first.clone()))?;
            let op2 = u64::try_from(ops[1]).map_err(|_| Error::Format(first.clone()))?;
            let seq = registry::transitions_for(op, op1, op2)?;
            // Parent state lines are unique along a trace: phases are
            // strictly ordered and the loop registers are monotone.
            let entry = seq
                .iter()
                .find(|(input, _)| input.lines().next() == Some(first.as_str()))
                .ok_or_else(|| Error::Format(first.clone()))?;
            Ok(entry.1.clone())
        } else {
            let seq = Self::primitive_transitions(op, &first)?;
            let at = seq
                .iter()
                .position(|(state, _)| state == &first)
                .ok_or_else(|| Error::Format(first.clone()))?;
            let (state, command) =
                seq.get(at + 1).ok_or_else(|| Error::Format(first.clone()))?;
            Ok(format!("{state}\n{command}\n"))
        }
    }

    fn primitive_transitions(op: Op, state_line: &str) -> Result<Vec<(String, String)>> {
        // Nested addition operands can exceed u64 (the all-nines reflection
        // sums), so primitives are rebuilt at full u128 width.
        Ok(match op {
            Op::LeftMask => {
                let ops = machine::parse_operands(state_line, op.token(), 1)?;
                left_mask::LeftMaskMachine::new(ops[0]).transitions()
            }
            Op::Add => {
                let ops = machine::parse_operands(state_line, op.token(), 2)?;
                addition::AdditionMachine::new(ops[0], ops[1]).transitions()
            }
            Op::Reflection => {
                let ops = machine::parse_operands(state_line, op.token(), 2)?;
                reflection::ReflectionMachine::new(ops[0], ops[1])?.transitions()
            }
            Op::Equal => {
                let ops = machine::parse_operands(state_line, op.token(), 2)?;
                equality::EqualityMachine::new(ops[0], ops[1]).transitions()
            }
            Op::GreaterThan => {
                let ops = machine::parse_operands(state_line, op.token(), 2)?;
                greater_than::GreaterThanMachine::new(ops[0], ops[1]).transitions()
            }
            Op::LessThan => {
                let ops = machine::parse_operands(state_line, op.token(), 2)?;
                less_than::LessThanMachine::new(ops[0], ops[1]).transitions()
            }
            Op::Sub | Op::Mul | Op::Div => {
                return Err(Error::UnknownOp(op.task().to_string()));
            }
        })
    }

    fn align(&self, task: &str, context: &str) -> Result<String> {
        // A raw expression aligns forward; anything else is a halted block
        // aligning back to result notation.
        if let Ok(aligned) = aligner::input_to_tm(context) {
            return Ok(aligned);
        }
        let op = Op::from_task(task)?;
        let line = context
            .trim()
            .lines()
            .next()
            .ok_or_else(|| Error::Format(context.to_string()))?;
        let ops = machine::parse_operands(line, op.token(), 2)?;
        aligner::tm_to_output(line, &ops[0].to_string(), &ops[1].to_string(), task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Oracle wrapper that corrupts the round-`n` candidate for one item.
    struct Saboteur {
        oracle: OracleSource,
        target: usize,
        round: usize,
        rounds_seen: usize,
    }

    impl CandidateSource for Saboteur {
        fn generate(&mut self, role: &str, contexts: &[String]) -> Vec<String> {
            let mut outputs = self.oracle.generate(role, contexts);
            if !role.ends_with("_aligner") {
                self.rounds_seen += 1;
                if self.rounds_seen == self.round && self.target < outputs.len() {
                    outputs[self.target] = outputs[self.target].replace("RIGHT", "LEFT");
                }
            }
            outputs
        }
    }

    fn init_context(op: Op, op1: u64, op2: u64) -> String {
        let seq = registry::transitions_for(op, op1, op2).unwrap();
        if op.is_composite() {
            seq[0].0.clone()
        } else {
            format!("{}\n{}\n", seq[0].0, seq[0].1)
        }
    }

    #[test]
    fn test_oracle_drives_primitive_batch_to_halt() {
        let mut source = OracleSource;
        let mut batch = vec![
            init_context(Op::Add, 345, 678),
            init_context(Op::Add, 9, 1),
            init_context(Op::Add, 0, 0),
        ];
        let mut corrects = vec![true; 3];
        let results =
            run_primitive(&mut source, Op::Add, &mut batch, &mut corrects, None).unwrap();
        assert_eq!(corrects, vec![true; 3]);
        for result in &results {
            assert!(result.contains(HALT_MESSAGE));
        }
        assert!(results[0].contains("|3|2|0|1"));
    }

    #[test]
    fn test_corrupted_candidate_fails_only_its_item() {
        let mut source =
            Saboteur { oracle: OracleSource, target: 1, round: 2, rounds_seen: 0 };
        let mut batch = vec![
            init_context(Op::Add, 345, 678),
            init_context(Op::Add, 345, 678),
        ];
        let mut corrects = vec![true; 2];
        let results =
            run_primitive(&mut source, Op::Add, &mut batch, &mut corrects, None).unwrap();
        assert_eq!(corrects, vec![true, false]);
        assert!(results[0].contains(HALT_MESSAGE));
        // The diagnostic records the context and the diverging candidate.
        assert!(results[1].contains("LEFT"));
    }

    #[test]
    fn test_oracle_drives_subtraction_through_all_calls() {
        let mut source = OracleSource;
        let mut batch = vec![init_context(Op::Sub, 47819, 12345)];
        let mut corrects = vec![true];
        let results =
            run_composite(&mut source, Op::Sub, &mut batch, &mut corrects).unwrap();
        assert_eq!(corrects, vec![true]);
        assert_eq!(results[0], "SUB, qH, [HEAD1]|9|1|8|7|4 [HEAD2]|5|4|3|2|1 |4|7|4|5|3");
    }

    #[test]
    fn test_oracle_drives_mixed_loop_lengths() {
        // Different multipliers leave the two items in different phases of
        // the loop during the same round.
        let mut source = OracleSource;
        let mut batch = vec![
            init_context(Op::Mul, 4513, 3),
            init_context(Op::Mul, 72, 1),
        ];
        let mut corrects = vec![true; 2];
        let results =
            run_composite(&mut source, Op::Mul, &mut batch, &mut corrects).unwrap();
        assert_eq!(corrects, vec![true; 2]);
        assert!(results[0].starts_with("MUL, qH,"));
        assert!(results[0].contains("|9|3|5|3|1"));
        assert!(results[1].contains("|2|7"));
    }

    #[test]
    fn test_oracle_drives_division() {
        let mut source = OracleSource;
        let mut batch = vec![init_context(Op::Div, 4513, 1504)];
        let mut corrects = vec![true];
        let results =
            run_composite(&mut source, Op::Div, &mut batch, &mut corrects).unwrap();
        assert_eq!(corrects, vec![true]);
        assert!(results[0].starts_with("DIV, qH,"));
        assert!(results[0].ends_with(" |3"));
    }

    #[test]
    fn test_aligned_pipeline_round_trips_notation() {
        let mut source = OracleSource;
        let (results, corrects) = run_execute(
            &mut source,
            Op::Add,
            vec!["345+678=".to_string()],
            true,
        )
        .unwrap();
        assert_eq!(corrects, vec![true]);
        assert_eq!(results[0], "345+678=1023");

        let (results, corrects) = run_execute(
            &mut source,
            Op::Sub,
            vec!["4531-1504=".to_string()],
            true,
        )
        .unwrap();
        assert_eq!(corrects, vec![true]);
        assert_eq!(results[0], "4531-1504=3027");
    }

    #[test]
    fn test_aligned_pipeline_records_bad_pre_alignment() {
        struct BadAligner;
        impl CandidateSource for BadAligner {
            fn generate(&mut self, role: &str, contexts: &[String]) -> Vec<String> {
                if role.ends_with("_aligner") {
                    vec!["garbage".to_string(); contexts.len()]
                } else {
                    OracleSource.generate(role, contexts)
                }
            }
        }
        let mut source = BadAligner;
        let (results, corrects) =
            run_execute(&mut source, Op::Add, vec!["1+1=".to_string()], true).unwrap();
        assert_eq!(corrects, vec![false]);
        assert!(results[0].contains("1+1="));
        assert!(results[0].contains("garbage"));
    }
}
