//! Accuracy helpers for scoring candidate responses against references.

/// Strip every echo of the context from a raw candidate.
pub fn extract_answer(input: &str, output: &str) -> String {
    output.replace(input, "")
}

/// Fraction of responses that match their reference exactly after trimming.
pub fn one_step_accuracy(responses: &[String], truths: &[String]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    let correct = responses
        .iter()
        .zip(truths)
        .filter(|(response, truth)| response.trim() == truth.trim())
        .count();
    correct as f64 / responses.len() as f64
}

/// Accuracy over full driver runs. Aligned references carry the raw prompt
/// as a prefix, since the post-alignment result restates the expression.
pub fn iter_accuracy(
    responses: &[String],
    truths: &[String],
    prompts: &[String],
    alignment: bool,
) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    let correct = responses
        .iter()
        .zip(truths.iter().zip(prompts))
        .filter(|(response, (truth, prompt))| {
            let expected =
                if alignment { format!("{prompt}{truth}") } else { truth.to_string() };
            response.trim() == expected.trim()
        })
        .count();
    correct as f64 / responses.len() as f64
}

/// Log running accuracy every `interval` items.
pub fn report_progress(done: usize, total: usize, batch: usize, accuracy: f64) {
    let interval = 100;
    let prev = done.saturating_sub(batch) / interval;
    if done / interval > prev {
        eprintln!("{}/{total} samples, accuracy = {accuracy}", (done / interval) * interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_answer_strips_every_echo() {
        assert_eq!(extract_answer("1+1=", "1+1=2"), "2");
        assert_eq!(extract_answer("ctx", "ctxctxout"), "out");
        assert_eq!(extract_answer("none", "out"), "out");
    }

    #[test]
    fn test_one_step_accuracy_trims() {
        let responses = vec!["a\n".to_string(), "b".to_string(), "x".to_string()];
        let truths = vec!["a".to_string(), " b ".to_string(), "y".to_string()];
        let accuracy = one_step_accuracy(&responses, &truths);
        assert!((accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(one_step_accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_iter_accuracy_prepends_prompt_when_aligned() {
        let responses = vec!["1+1=2".to_string()];
        let truths = vec!["2".to_string()];
        let prompts = vec!["1+1=".to_string()];
        assert_eq!(iter_accuracy(&responses, &truths, &prompts, true), 1.0);
        assert_eq!(iter_accuracy(&responses, &truths, &prompts, false), 0.0);
    }
}
