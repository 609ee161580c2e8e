//! Dataset construction: instruction prompts, trace sampling over the digit
//! grid, truncation, and the train/test file writers.
//!
//! Train splits are JSON instruction arrays, test splits are JSONL
//! prompt/response lines, raw splits are JSONL for both. Grid cells are
//! generated in parallel with per-cell seeds derived from the run seed, so
//! output is reproducible regardless of worker scheduling.

use crate::aligner;
use crate::error::{Error, Result};
use crate::generator::{
    raw_answer, AlignerPairGenerator, Budget, CompareBias, EqualBias, Proportioner, SeqGenerator,
};
use crate::registry::{self, Op};
use crate::{division, multiplication};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const ADDITION_PROMPT: &str = "The following is a state paired with a command to be executed of a Turing Machine that performs addition.

The state includes the current operator, the current state of the machine, the current tape contents, and the current head positions.
- There are three states in the machine: q0, q1, and qH. The machine starts in state q0 and halts when it reaches state qH. q1 is the state where the machine does the addition operation.
- The head positions are represented by [HEAD1] and [HEAD2], which indicate the positions of the heads on the two operands.
- The carry register is represented by [C].
- The output position is represented by [OUTPUT].

The command includes a series of actions to be executed by the machine and they are separated by commas.
- [C] <number>: Write the number to the carry register.
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs addition by reading the digits from the two operands and writing the sum to the output tape.

Based on the current state and the command, predict the next state of the machine and next command to be executed.

";

pub const REFLECTION_PROMPT: &str = "The following is a state paired with a command to be executed of a Turing Machine that performs reflection.

The state includes the current operator, the current state of the machine, the current tape contents, and the current head positions.
- There are three states in the machine: q0, q1, q2 and qH. The machine starts in state q0 and halts when it reaches state qH. q1 is the state where the machine does the reflection operation. q2 is the state where the machine removes the leading zeros from the output tape.
- The head positions are represented by [HEAD1] and [HEAD2], which indicate the positions of the heads on the two operands.
- The output position is represented by [OUTPUT].

The command includes a series of actions to be executed by the machine and they are separated by commas.
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs reflection by reading the digits from the two operands and writing the subtrction result to the output tape.

Based on the current state and the command, predict the next state of the machine and next command to be executed.

";

pub const LEFT_MASK_PROMPT: &str = "The following is a state paired with a command to be executed of a Turing Machine that performs left mask.

Left mask is a operation that removes the highest digit of the operand and writes the remaining digits to the output tape. Note that after removing the highest digit, if there are leading zeros, they should be removed as well.

The state includes the current operator, the current state of the machine, the current tape contents, and the current head positions.
- There are four states in the machine: q0, q1, q2, and qH. The machine starts in state q0 and halts when it reaches state qH. q1 is the state where the machine does copying or masking operation according to the current head position. q2 is the state where the machine removes the leading zeros.
- The head position is represented by [HEAD], which indicate the position of the head on the operand.
- The output position is represented by [OUTPUT].

The command includes a series of actions to be executed by the machine and they are separated by commas.
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs left mask operation by copying the digits to the output tape and masking the last digit.

Based the current state and the command, predict the next state of the machine and next command to be executed.

";

pub const SUBTRACTION_PROMPT: &str = "The following is a input to be executed of a Turing Machine that performs subtraction.

To solve a substraction problem by the machine, the machine is required to provide the initial state and command for other basic machines, including addition, reflection and left mask.

For example, for 47819 - 12345 = 35474, the machine will perform the following steps:
- step 1: call reflection, 99999 - 12345 = 87654
- step 2: call addtion, 47819 + 87654 = 135473
- step 3: call addtion, 135473 + 1 = 135474
- step 4: call left mask, left_mask(135474) = 35474

The input may includes four lines or the original subtraction problem.
When it is original problem, generate the initial subtraction state, command and prepare the initial state and the first command of the first called machine.
When it includes four lines, it means the previous state, command and the result of the called machine. In detail:
- The first line is the current state of the machine.
- The second line is the command to be executed.
- The third line and the fourth line are halt state of another machine which is called by the subtraction machine at previous step.

For the current state (the first line):
- There are five states in the machine: q0, q1, q2, q3 and qH. The machine starts in state q0 and halts when it reaches state qH.
- The head positions are represented by [HEAD1] and [HEAD2], which followed by two operands.

The command (the second line) includes a series of actions to be executed by the machine and they are separated by commas.
- [CALL] <operation>: Call another machine to perform the operation.
- <state>: Move the machine to the state.

When the commands include [CALL], another extra two lines are needed to specify the initial state and the first command of the machine to be called.
As for initial state, it should include the operation, q0 state, operands and the head positions.
As for the first command:
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs subtraction by reading the digits from the two operands and calling other machines to complete the subtraction operation.

Based on the current input, predict the output which includes next state, next command and the initial state and the first command of the machine to be called.

";

pub const EQUAL_PROMPT: &str = "The following is a state paired with a command to be executed of a Turing Machine that performs equality comparison.

The state includes the current operator, the current state of the machine, the current tape contents, and the current head positions.
- There are three states in the machine: q0, q1, and qH. The machine starts in state q0 and halts when it reaches state qH. q1 is the state where the machine does the equality comparison.
- The head positions are represented by [HEAD1] and [HEAD2], which indicate the positions of the heads on the two operands.
- The output position is represented by [OUTPUT].

The command includes a series of actions to be executed by the machine and they are separated by commas.
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs equality comparison by reading the digits from the two operands and writing the result to the output tape.

Based on the current state and the command, predict the next state of the machine and next command to be executed.

";

pub const GREATER_THAN_PROMPT: &str = "The following is a state paired with a command to be executed of a Turing Machine that determines whether the first operand is greater than the second operand.

The state includes the current operator, the current state of the machine, the current tape contents, and the current head positions.
- There are three states in the machine: q0, q1, and qH. The machine starts in state q0 and halts when it reaches state qH. q1 is the state where the machine does the comparison.
- The head positions are represented by [HEAD1] and [HEAD2], which indicate the positions of the heads on the two operands.
- The output position is represented by [OUTPUT].

The command includes a series of actions to be executed by the machine and they are separated by commas.
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs comparison by reading the digits from the two operands and writing the result to the output tape.

Based on the current state and the command, predict the next state of the machine and next command to be executed.

";

pub const LESS_THAN_PROMPT: &str = "The following is a state paired with a command to be executed of a Turing Machine that determines whether the first operand is less than the second operand.

The state includes the current operator, the current state of the machine, the current tape contents, and the current head positions.
- There are three states in the machine: q0, q1, and qH. The machine starts in state q0 and halts when it reaches state qH. q1 is the state where the machine does the comparison.
- The head positions are represented by [HEAD1] and [HEAD2], which indicate the positions of the heads on the two operands.
- The output position is represented by [OUTPUT].

The command includes a series of actions to be executed by the machine and they are separated by commas.
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs comparison by reading the digits from the two operands and writing the result to the output tape.

Based on the current state and the command, predict the next state of the machine and next command to be executed.

";

pub const MULTIPLICATION_PROMPT: &str = "The following is a input to be executed of a Turing Machine that performs multiplication.

To solve a multiplication problem by the machine, the machine is required to provide the initial state and command for other basic machines, including addition and less_than machines.

For example, for 4513 * 3 = 13539, the machine will perform the following algorithm:
- step 1: cnt = 1, sum = 4513(oprand1)
- step 2: call less_than, determine whether cnt < 3(oprand2), if yes, go to step 3, otherwise, go to step 5
- step 3: call addition, sum = sum + 4513(oprand1)
- step 4: call addition, cnt = cnt + 1, go to step 2
- step 5: current machine halts

The input includes at least two lines and may have two more lines.
- The first line is the current state of the machine.
- The second line is the command to be executed.
When there are two more lines:
- The third line and the fourth line are halt state of another machine which is called by the multiplication machine at previous step.

For the current state (the first line):
- There are five states in the machine: q0, q1, q2, q3 and qH. The machine starts in state q0 and halts when it reaches state qH. q1, q2 and q3 are used to perform the loop structure.
- The head positions are represented by [HEAD1] and [HEAD2], which followed by two operands.

The command (the second line) includes a series of actions to be executed by the machine and they are separated by commas.
- [OUTPUT] <number>: Write the number to the output position.
- [COUNT] <number>: Write the number to the count register.
- [CALL] <operation>: Call another machine to perform the operation.
- <state>: Move the machine to the state.

When the commands include [CALL], another extra two lines are needed to specify the initial state and the first command of the machine to be called.
As for initial state, it should include the operation, q0 state, operands and the head positions.
As for the first command:
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs multiplication by reading the digits from the two operands and calling other machines to complete the multiplication operation.

Based on the current input, predict the output which includes next state, next command and the initial state and the first command of the machine to be called.

";

pub const DIVISION_PROMPT: &str = "The following is a input to be executed of a Turing Machine that performs division.

To solve a division problem by the machine, the machine is required to provide the initial state and command for other basic machines, including addition and greater_than machines.

For example, for 4513 // 1504 = 3, the machine will perform the following algorithm:
- step 1: output = 0, cnt = 1504(oprand2)
- step 2: call greater_than, determine whether cnt > 4513(oprand1), if yes, go to step 5, otherwise, go to step 3
- step 3: call addition, output = output + 1
- step 4: call addition, cnt = cnt + 1504, go to step 2
- step 5: current machine halts, output is the result

The input includes at least two lines and may have two more lines.
- The first line is the current state of the machine.
- The second line is the command to be executed.
When there are two more lines:
- The third line and the fourth line are halt state of another machine which is called by the division machine at previous step.

For the current state (the first line):
- There are five states in the machine: q0, q1, q2, q3 and qH. The machine starts in state q0 and halts when it reaches state qH. q1, q2 and q3 are used to perform the loop structure.
- The head positions are represented by [HEAD1] and [HEAD2], which followed by two operands.

The command (the second line) includes a series of actions to be executed by the machine and they are separated by commas.
- [OUTPUT] <number>: Write the number to the output position.
- [COUNT] <number>: Write the number to the count register.
- [CALL] <operation>: Call another machine to perform the operation.
- <state>: Move the machine to the state.

When the commands include [CALL], another extra two lines are needed to specify the initial state and the first command of the machine to be called.
As for initial state, it should include the operation, q0 state, operands and the head positions.
As for the first command:
- [OUTPUT] <number>: Write the number to the output position.
- [OUTPUT] <direction>: Move the output head to the direction.
- [HEAD1] <direction>: Move the head on the first operand to the direction.
- [HEAD2] <direction>: Move the head on the second operand to the direction.
- <state>: Move the machine to the state.

The machine performs division by reading the digits from the two operands and calling other machines to complete the division operation.

Based on the current input, predict the output which includes next state, next command and the initial state and the first command of the machine to be called.

";

pub const ALIGNMENT_PROMPT: &str = "The following is an input to a Turing Machine or an output of a Turing Machine.

The task is doing an alignment:
- If it is an input, adapt the original input to the format that the Turing Machine can understand.
- If it is an output, adapt the original output to the format that represents the final result.

Input example:
```
- input:
1504+2379=
- output:
ADD, q0, [HEAD1] |4|0|5|1[HEAD2] |9|7|3|2 [C] [OUTPUT]
CMD: [C] 0, [HEAD1] RIGHT, [HEAD2] RIGHT, q1
```

Output example:
```
- input:
MUL, qH, [HEAD1]|4|1|8|4|4 [HEAD2]|5 [COUNT]|5 |0|7|0|4|2|2
No command to execute. Halt state.
- output:
44814*5=224070

```

There are two lines that represent the Turing Machine:
- The first line is the current state of the machine.
- The second line is the command to be executed.
And this format is fit to both input and output as the examples shown above.

For the current state (the first line):
- There are at least 2 states in the machine: q0 and qH. The machine starts in state q0 and halts when it reaches state qH.
- The head positions are represented by [HEAD1] and [HEAD2], which followed by two operands.

The command (the second line) includes a series of actions to be executed by the machine and they are separated by commas.
- [HEAD] <direction>: Move the head to the direction.
- [OUTPUT] <direction>: Move the output head to the direction.
- [OUTPUT] <number>: Write the number to the output position.
- [C] <number>: Write the number to the carry out register.
- [COUNT] <number>: Write the number to the count register.
- [CALL] <operation>: Call another machine to perform the operation.
- <state>: Move the machine to the state.

Based on the input, determine it is an input or an output, and adapt it to the format correspondingly.

";

pub fn prompt_for(op: Op) -> &'static str {
    match op {
        Op::Add => ADDITION_PROMPT,
        Op::Reflection => REFLECTION_PROMPT,
        Op::LeftMask => LEFT_MASK_PROMPT,
        Op::Sub => SUBTRACTION_PROMPT,
        Op::Equal => EQUAL_PROMPT,
        Op::GreaterThan => GREATER_THAN_PROMPT,
        Op::LessThan => LESS_THAN_PROMPT,
        Op::Mul => MULTIPLICATION_PROMPT,
        Op::Div => DIVISION_PROMPT,
    }
}

/// One prompt/response training example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub prompt: String,
    pub response: String,
}

impl Sample {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Sample { prompt: prompt.into(), response: response.into() }
    }
}

/// Train-split record layout.
#[derive(Debug, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

/// Test- and raw-split record layout.
#[derive(Debug, Serialize, Deserialize)]
pub struct PromptRecord {
    pub prompt: String,
    pub response: String,
}

/// Shuffle and write samples as a pretty-printed JSON instruction array.
pub fn write_json_samples(
    mut samples: Vec<Sample>,
    path: &Path,
    rng: &mut SmallRng,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    samples.shuffle(rng);
    let mut text = String::from("[\n");
    for (i, sample) in samples.iter().enumerate() {
        if i != 0 {
            text.push_str(",\n");
        }
        let record = InstructionRecord {
            instruction: sample.prompt.clone(),
            input: String::new(),
            output: sample.response.clone(),
        };
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        record.serialize(&mut serializer)?;
        text.push_str(&String::from_utf8(buf).map_err(|e| Error::Format(e.to_string()))?);
    }
    text.push_str("\n]\n");
    fs::write(path, text)?;
    Ok(())
}

/// Shuffle and write samples as JSONL prompt/response lines.
pub fn write_jsonl_samples(
    mut samples: Vec<Sample>,
    path: &Path,
    rng: &mut SmallRng,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    samples.shuffle(rng);
    let mut text = String::new();
    for sample in &samples {
        let record = PromptRecord { prompt: sample.prompt.clone(), response: sample.response.clone() };
        text.push_str(&serde_json::to_string(&record)?);
        text.push('\n');
    }
    fs::write(path, text)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Default shuffle seed, fixed per split so reruns are reproducible.
    pub fn default_seed(self) -> u64 {
        match self {
            Split::Train => 42,
            Split::Test => 43,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    Execute,
    Raw,
    Alignment,
    Separate,
}

/// What to build: one operation's dataset, or the mixed alignment dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTask {
    Op(Op),
    Alignment,
}

pub struct BuildConfig {
    pub task: BuildTask,
    pub split: Split,
    pub setting: Setting,
    pub min_digits: u32,
    pub max_digits: u32,
    pub num: usize,
    pub no_prompt: bool,
    pub init: bool,
    pub out_dir: PathBuf,
    pub seed: u64,
}

impl BuildConfig {
    fn suffix(&self) -> &'static str {
        if self.no_prompt { "_no_prompt" } else { "" }
    }

    fn target_path(&self, name: &str) -> PathBuf {
        let suffix = self.suffix();
        let (min, max) = (self.min_digits, self.max_digits);
        let relative = match (self.setting, self.split) {
            (Setting::Raw, Split::Train) => format!("raw/{name}/train.jsonl"),
            (Setting::Raw, Split::Test) => format!("raw/{name}/test_{min}_{max}.jsonl"),
            (Setting::Alignment, Split::Train) => format!("train/{name}_alignment{suffix}.json"),
            (Setting::Alignment, Split::Test) => {
                format!("test/{name}_{min}_{max}_alignment{suffix}.jsonl")
            }
            (_, Split::Train) => format!("train/execute_{name}{suffix}.json"),
            (_, Split::Test) => format!("test/execute_{name}_{min}_{max}{suffix}.jsonl"),
        };
        self.out_dir.join(relative)
    }

    fn write(&self, samples: Vec<Sample>, path: &Path) -> Result<()> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        if self.split == Split::Train && self.setting != Setting::Raw {
            write_json_samples(samples, path, &mut rng)
        } else {
            write_jsonl_samples(samples, path, &mut rng)
        }
    }
}

/// Build the configured dataset; returns the files written.
pub fn build(config: &BuildConfig) -> Result<Vec<PathBuf>> {
    match config.task {
        BuildTask::Alignment => build_alignment(config),
        BuildTask::Op(op) => match config.setting {
            Setting::Separate => separate(config, op),
            _ => build_op(config, op),
        },
    }
}

fn join_pair(pair: &(String, String)) -> String {
    format!("{}\n{}\n", pair.0, pair.1)
}

fn cell_seed(base: u64, a_n_digits: u32, b_n_digits: u32) -> u64 {
    base ^ ((a_n_digits as u64) << 32) ^ ((b_n_digits as u64) << 16)
}

/// Turn a transition sequence into prompt/response samples.
///
/// Composite sequences already pair whole input and output blocks;
/// primitive sequences pair consecutive (state, command) lines. Init mode
/// keeps only the problem boundary: the first input against its own output
/// for subtraction, against the final output for everything else.
fn seq_to_samples(op: Op, seq: &[(String, String)], prompt: &str, init: bool) -> Vec<Sample> {
    if op.is_composite() {
        let samples: Vec<Sample> = seq
            .iter()
            .map(|(input, output)| Sample::new(format!("{prompt}{input}"), output.clone()))
            .collect();
        if init {
            return match (op, samples.first(), samples.last()) {
                (Op::Sub, Some(first), _) => vec![first.clone()],
                (_, Some(first), Some(last)) => {
                    vec![Sample::new(first.prompt.clone(), last.response.clone())]
                }
                _ => Vec::new(),
            };
        }
        return samples;
    }
    if init {
        return match (seq.first(), seq.last()) {
            (Some(first), Some(last)) => vec![Sample::new(join_pair(first), join_pair(last))],
            _ => Vec::new(),
        };
    }
    seq.windows(2)
        .map(|w| Sample::new(format!("{prompt}{}", join_pair(&w[0])), join_pair(&w[1])))
        .collect()
}

/// Cut a long trace down to a handful of representative steps. Boundary
/// steps always survive; interior steps are drawn at random, and reflection
/// additionally pins the copy-to-trim phase change.
fn truncate(op: Op, samples: Vec<Sample>, rng: &mut SmallRng) -> Vec<Sample> {
    let len = samples.len();
    match op {
        Op::Sub => samples,
        Op::Mul | Op::Div | Op::LeftMask => {
            let cap = if op == Op::LeftMask { 5 } else { 10 };
            if len <= cap {
                return samples;
            }
            let mut kept = vec![samples[0].clone(), samples[len - 1].clone()];
            for _ in 0..3 {
                kept.push(samples[rng.gen_range(1..=len - 2)].clone());
            }
            kept
        }
        Op::Equal => {
            if len <= 5 {
                return samples;
            }
            let mut kept = vec![
                samples[0].clone(),
                samples[len - 1].clone(),
                samples[len - 2].clone(),
                samples[len - 3].clone(),
            ];
            for _ in 0..5 {
                kept.push(samples[rng.gen_range(1..=len - 4)].clone());
            }
            kept
        }
        Op::Add | Op::GreaterThan | Op::LessThan => {
            if len <= 5 {
                return samples;
            }
            let mut kept =
                vec![samples[0].clone(), samples[len - 1].clone(), samples[len - 2].clone()];
            for _ in 0..4 {
                kept.push(samples[rng.gen_range(1..=len - 3)].clone());
            }
            kept
        }
        Op::Reflection => {
            if len <= 10 {
                return samples;
            }
            let Some(idx) = samples.iter().position(|s| s.response.contains("CMD q2")) else {
                return samples;
            };
            let mut kept = vec![
                samples[0].clone(),
                samples[len - 1].clone(),
                samples[idx].clone(),
                samples[idx + 1].clone(),
            ];
            if idx > 1 {
                for _ in 0..4 {
                    kept.push(samples[rng.gen_range(1..=idx - 1)].clone());
                }
            }
            if idx + 2 != len - 1 {
                for _ in 0..3 {
                    kept.push(samples[rng.gen_range(idx + 2..=len - 2)].clone());
                }
            }
            kept
        }
    }
}

/// Operand pair for one draw of the grid cell. Equality and the ordering
/// comparisons alternate into their biased regimes on same-width cells so
/// the boundary verdicts stay represented.
fn draw_ops(
    generator: &mut SeqGenerator,
    op: Op,
    a_n_digits: u32,
    b_n_digits: u32,
    draw: usize,
) -> Option<(u64, u64)> {
    let boundary = a_n_digits == b_n_digits && draw % 2 == 0;
    Some(match op {
        Op::Add => generator.add_ops(a_n_digits, b_n_digits),
        Op::Sub => generator.sub_ops(a_n_digits, b_n_digits),
        Op::Equal => {
            let bias = if boundary { EqualBias::Equal } else { EqualBias::Random };
            generator.equal_ops(a_n_digits, b_n_digits, bias)
        }
        Op::GreaterThan | Op::LessThan => {
            let bias = if boundary { Some(CompareBias::Equal) } else { None };
            generator.compare_ops(a_n_digits, b_n_digits, bias)
        }
        Op::Mul => generator.mul_ops(a_n_digits, b_n_digits),
        Op::Div => generator.div_ops(a_n_digits, b_n_digits)?,
        Op::Reflection => generator.reflection_ops(a_n_digits, b_n_digits),
        Op::LeftMask => (generator.left_mask_op(a_n_digits, false), 0),
    })
}

fn execute_cell(
    config: &BuildConfig,
    op: Op,
    a_n_digits: u32,
    b_n_digits: u32,
    count: usize,
    seed: u64,
) -> Result<Vec<Sample>> {
    let mut generator = SeqGenerator::new(seed);
    let mut rng = SmallRng::seed_from_u64(seed.rotate_left(17));
    let prompt = if config.no_prompt { "" } else { prompt_for(op) };
    let mut samples = Vec::new();
    let push = |samples: &mut Vec<Sample>, rng: &mut SmallRng, op1: u64, op2: u64| -> Result<()> {
        let seq = registry::transitions_for(op, op1, op2)?;
        let built = seq_to_samples(op, &seq, prompt, config.init);
        if config.init {
            samples.extend(built);
        } else {
            samples.extend(truncate(op, built, rng));
        }
        Ok(())
    };
    match op {
        Op::LeftMask => {
            // Each draw yields a zero-run operand and a zero-free one.
            for _ in 0..count / 2 {
                let plain = generator.left_mask_op(a_n_digits, false);
                push(&mut samples, &mut rng, plain, 0)?;
                let no_zero = generator.left_mask_op(a_n_digits, true);
                push(&mut samples, &mut rng, no_zero, 0)?;
            }
        }
        Op::Reflection => {
            for draw in 0..count {
                let (op1, op2) = generator.reflection_ops(a_n_digits, b_n_digits);
                push(&mut samples, &mut rng, op1, op2)?;
                let leading_zero = config.split == Split::Train
                    && a_n_digits == b_n_digits
                    && draw % 2 == 0;
                if leading_zero {
                    let (op1, op2) = generator.reflection_leading_zero_ops(a_n_digits);
                    push(&mut samples, &mut rng, op1, op2)?;
                }
            }
        }
        _ => {
            for draw in 0..count {
                let Some((op1, op2)) = draw_ops(&mut generator, op, a_n_digits, b_n_digits, draw)
                else {
                    continue;
                };
                push(&mut samples, &mut rng, op1, op2)?;
            }
        }
    }
    Ok(samples)
}

fn alignment_cell(
    config: &BuildConfig,
    op: Op,
    a_n_digits: u32,
    b_n_digits: u32,
    count: usize,
    seed: u64,
) -> Result<Vec<Sample>> {
    let symbol = op.symbol().ok_or_else(|| Error::UnknownOp(op.task().to_string()))?;
    let mut generator = SeqGenerator::new(seed);
    let mut samples = Vec::new();
    for draw in 0..count {
        let Some((op1, op2)) = draw_ops(&mut generator, op, a_n_digits, b_n_digits, draw) else {
            continue;
        };
        let raw_input = format!("{op1}{symbol}{op2}=");
        let raw_output = format!("{raw_input}{}", raw_answer(op, op1, op2)?);
        let aligned = aligner::input_to_tm(&raw_input)?;
        // Loop machines have a direct boundary rendering; everything else
        // takes the tail of its full sequence.
        let block = match op {
            Op::Mul => multiplication::MultiplicationMachine::new(op1, op2).boundary_blocks().1,
            Op::Div => division::DivisionMachine::new(op1, op2)?.boundary_blocks().1,
            _ => {
                let seq = registry::transitions_for(op, op1, op2)?;
                let last = seq.last().ok_or_else(|| Error::Format(raw_input.clone()))?;
                if op.is_composite() { last.1.clone() } else { join_pair(last) }
            }
        };
        let (input_prompt, output_prompt) = if config.no_prompt {
            (raw_input, block)
        } else {
            (format!("{ALIGNMENT_PROMPT}{raw_input}"), format!("{ALIGNMENT_PROMPT}{block}"))
        };
        samples.push(Sample::new(input_prompt, aligned));
        samples.push(Sample::new(output_prompt, raw_output));
    }
    Ok(samples)
}

fn raw_cell(
    op: Op,
    a_n_digits: u32,
    b_n_digits: u32,
    count: usize,
    seed: u64,
) -> Result<Vec<Sample>> {
    let mut generator = SeqGenerator::new(seed);
    let mut samples = Vec::new();
    for draw in 0..count {
        let Some((op1, op2)) = draw_ops(&mut generator, op, a_n_digits, b_n_digits, draw) else {
            continue;
        };
        let (input, output) = generator.raw_pair(op, op1, op2)?;
        samples.push(Sample::new(input, output));
    }
    Ok(samples)
}

/// Digit-grid cells with their sample budgets.
fn grid(config: &BuildConfig, op: Op) -> Vec<(u32, u32, usize)> {
    let proportioner = Proportioner::new(config.min_digits, config.max_digits, config.num);
    let mut cells = Vec::new();
    for a_n_digits in config.min_digits..=config.max_digits {
        let b_range: Vec<u32> = match op {
            // The operand pair is symmetric after the swap, so only half
            // the grid is distinct.
            Op::Sub | Op::Reflection => (config.min_digits..=a_n_digits).collect(),
            Op::LeftMask => vec![a_n_digits],
            _ => (config.min_digits..=config.max_digits).collect(),
        };
        for b_n_digits in b_range {
            let count = match op {
                Op::Reflection => {
                    if config.split == Split::Train && a_n_digits == b_n_digits {
                        config.num * 2
                    } else {
                        config.num
                    }
                }
                Op::LeftMask => config.num,
                _ => proportioner.cell_count(Budget::Task(op), a_n_digits, b_n_digits),
            };
            cells.push((a_n_digits, b_n_digits, count));
        }
    }
    cells
}

fn build_op(config: &BuildConfig, op: Op) -> Result<Vec<PathBuf>> {
    // Short-loop raw test splits keep multiplication and division traces
    // executable end to end.
    let samples: Vec<Sample> = if config.setting == Setting::Raw
        && config.split == Split::Test
        && matches!(op, Op::Mul | Op::Div)
    {
        let proportioner = Proportioner::new(config.min_digits, config.max_digits, config.num);
        let mut samples = Vec::new();
        for n_digits in config.min_digits..=config.max_digits {
            let count = proportioner.cell_count(Budget::Task(op), n_digits, 1);
            let mut generator = SeqGenerator::new(cell_seed(config.seed, n_digits, 1));
            for _ in 0..count {
                let (input, output) = if op == Op::Mul {
                    generator.mul_raw_fixed_op2(n_digits, None)
                } else {
                    generator.div_raw_fixed_result(n_digits, None)
                };
                samples.push(Sample::new(input, output));
            }
        }
        samples
    } else {
        let cells = grid(config, op);
        cells
            .par_iter()
            .map(|&(a, b, count)| {
                let seed = cell_seed(config.seed, a, b);
                match config.setting {
                    Setting::Execute => execute_cell(config, op, a, b, count, seed),
                    Setting::Alignment => alignment_cell(config, op, a, b, count, seed),
                    Setting::Raw => raw_cell(op, a, b, count, seed),
                    Setting::Separate => Err(Error::Format("separate is test-only".to_string())),
                }
            })
            .collect::<Result<Vec<Vec<Sample>>>>()?
            .into_iter()
            .flatten()
            .collect()
    };
    let path = config.target_path(op.task());
    config.write(samples, &path)?;
    Ok(vec![path])
}

fn build_alignment(config: &BuildConfig) -> Result<Vec<PathBuf>> {
    let proportioner = Proportioner::new(config.min_digits, config.max_digits, config.num);
    let mut cells = Vec::new();
    for a_n_digits in config.min_digits..=config.max_digits {
        for b_n_digits in config.min_digits..=config.max_digits {
            let count = proportioner.cell_count(Budget::Align, a_n_digits, b_n_digits);
            cells.push((a_n_digits, b_n_digits, count));
        }
    }
    let samples: Vec<Sample> = cells
        .par_iter()
        .map(|&(a, b, count)| alignment_mixed_cell(config, a, b, count, cell_seed(config.seed, a, b)))
        .collect::<Result<Vec<Vec<Sample>>>>()?
        .into_iter()
        .flatten()
        .collect();
    let suffix = config.suffix();
    let path = match config.split {
        Split::Train => config.out_dir.join(format!("train/alignment{suffix}.json")),
        Split::Test => config.out_dir.join(format!(
            "test/alignment_{}_{}{suffix}.jsonl",
            config.min_digits, config.max_digits
        )),
    };
    config.write(samples, &path)?;
    Ok(vec![path])
}

fn alignment_mixed_cell(
    config: &BuildConfig,
    a_n_digits: u32,
    b_n_digits: u32,
    count: usize,
    seed: u64,
) -> Result<Vec<Sample>> {
    let mut generator = AlignerPairGenerator::new(seed);
    let mut samples = Vec::new();
    let push = |samples: &mut Vec<Sample>, pair: Option<(String, String)>| {
        if let Some((input, output)) = pair {
            let prompt = if config.no_prompt {
                input
            } else {
                format!("{ALIGNMENT_PROMPT}{input}")
            };
            samples.push(Sample::new(prompt, output));
        }
    };
    for draw in 0..count {
        let pair = if draw % 2 == 0 {
            generator.input_pair(a_n_digits, b_n_digits, None)?
        } else {
            generator.output_pair(a_n_digits, b_n_digits, None)?
        };
        push(&mut samples, pair);
    }
    // Extra loop-machine coverage on the narrow cells where their traces
    // stay short.
    if a_n_digits <= 5 && b_n_digits <= 5 {
        for draw in 0..count * 10 {
            for op in [Op::Mul, Op::Div] {
                let pair = if draw % 2 == 0 {
                    generator.input_pair(a_n_digits, b_n_digits, Some(op))?
                } else {
                    generator.output_pair(a_n_digits, b_n_digits, Some(op))?
                };
                push(&mut samples, pair);
            }
        }
    }
    Ok(samples)
}

/// Re-split a raw test file into executor and aligner test files.
fn separate(config: &BuildConfig, op: Op) -> Result<Vec<PathBuf>> {
    let raw_path = config.out_dir.join(format!(
        "raw/{}/test_{}_{}.jsonl",
        op.task(),
        config.min_digits,
        config.max_digits
    ));
    let mut executor_samples = Vec::new();
    let mut aligner_input_samples = Vec::new();
    let mut aligner_output_samples = Vec::new();
    let reader = BufReader::new(fs::File::open(&raw_path)?);
    for line in reader.lines() {
        let record: PromptRecord = serde_json::from_str(&line?)?;
        let raw_input = record.prompt;
        let (op1_text, parsed, op2_text) = aligner::parse_expression(&raw_input)?;
        if parsed != op {
            return Err(Error::Format(raw_input));
        }
        let op1: u64 = op1_text.parse().map_err(|_| Error::Format(raw_input.clone()))?;
        let op2: u64 = op2_text.parse().map_err(|_| Error::Format(raw_input.clone()))?;
        let tm_input = aligner::input_to_tm(&raw_input)?;
        let raw_output = format!("{raw_input}{}", raw_answer(op, op1, op2)?);
        let seq = registry::transitions_for(op, op1, op2)?;
        let last = seq.last().ok_or_else(|| Error::Format(raw_input.clone()))?;
        let tm_output = if op.is_composite() { last.1.clone() } else { join_pair(last) };
        executor_samples.push(Sample::new(tm_input.clone(), tm_output.clone()));
        aligner_input_samples.push(Sample::new(raw_input, tm_input));
        aligner_output_samples.push(Sample::new(tm_output, raw_output));
    }
    let mut rng = SmallRng::seed_from_u64(config.seed);
    let mut written = Vec::new();
    for (samples, suffix) in [
        (executor_samples, "executor"),
        (aligner_input_samples, "aligner_input"),
        (aligner_output_samples, "aligner_output"),
    ] {
        let path = config.out_dir.join(format!(
            "test/execute_{}_{}_{}_{suffix}.jsonl",
            op.task(),
            config.min_digits,
            config.max_digits
        ));
        write_jsonl_samples(samples, &path, &mut rng)?;
        written.push(path);
    }
    Ok(written)
}
