const TASK_FRAMING: &str =
    "You are an experienced programming instructor grading a student's code submission.";

const RESPONSE_SHAPE: &str = "Respond in exactly this format:
- First, one line per problem in the form \"<line-number>: <short description>\", where \
<line-number> is the 1-based line of the submission the problem is on.
- Then a single blank line.
- Then free-form feedback for the student.
If there are no problems, start your response with the blank line.";

/// Builds the single prompt sent to the model. Section order is fixed.
pub(crate) fn compose(assignment: &str, focus: Option<&str>, source: &str) -> String {
    let mut prompt = String::with_capacity(
        TASK_FRAMING.len() + RESPONSE_SHAPE.len() + assignment.len() + source.len() + 128,
    );

    prompt.push_str(TASK_FRAMING);
    prompt.push_str("\n\nAssignment:\n");
    prompt.push_str(assignment.trim());
    prompt.push_str("\n\n");

    if let Some(focus) = focus.map(str::trim).filter(|focus| !focus.is_empty()) {
        prompt.push_str("Pay particular attention to: ");
        prompt.push_str(focus);
        prompt.push_str("\n\n");
    }

    prompt.push_str(RESPONSE_SHAPE);
    prompt.push_str("\n\nSubmission:\n---\n");
    prompt.push_str(source);
    if !source.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("---\n");
    prompt
}
