use bda_core::domain::StructuredAnswer;
use bda_core::error::AppError;

/// Parser position while scanning a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    BeforeFirstHeader,
    Summary,
    Alignment,
    Actions,
    Limitations,
}

fn header_for(line: &str) -> Option<Section> {
    let lower = line.to_lowercase();
    if lower.contains("summary of findings") {
        Some(Section::Summary)
    } else if lower.contains("policy alignment") {
        Some(Section::Alignment)
    } else if lower.contains("recommended actions") {
        Some(Section::Actions)
    } else if lower.contains("limitations") && lower.contains("confidence") {
        Some(Section::Limitations)
    } else {
        None
    }
}

fn slot(answer: &mut StructuredAnswer, section: Section) -> Option<&mut String> {
    match section {
        Section::BeforeFirstHeader => None,
        Section::Summary => Some(&mut answer.summary_of_findings),
        Section::Alignment => Some(&mut answer.policy_alignment),
        Section::Actions => Some(&mut answer.recommended_actions),
        Section::Limitations => Some(&mut answer.limitations_confidence),
    }
}

fn flush(answer: &mut StructuredAnswer, section: Section, lines: &mut Vec<&str>) {
    if lines.is_empty() {
        return;
    }
    if let Some(target) = slot(answer, section) {
        *target = lines.join("\n").trim().to_string();
    }
    lines.clear();
}

/// Split a model reply into the four answer sections.
///
/// Header lines are recognised case-insensitively anywhere in the line and are not kept. Text
/// before the first header, blank lines and `**` decoration lines are dropped. A section repeated
/// later in the reply replaces the earlier one. Any section left empty fails with
/// `INCOMPLETE_RESPONSE`.
pub fn parse_sections(reply: &str) -> Result<StructuredAnswer, AppError> {
    let mut answer = StructuredAnswer::default();
    let mut state = Section::BeforeFirstHeader;
    let mut content: Vec<&str> = Vec::new();

    for line in reply.lines() {
        if let Some(next) = header_for(line) {
            flush(&mut answer, state, &mut content);
            state = next;
            continue;
        }
        if state == Section::BeforeFirstHeader {
            continue;
        }
        if !line.starts_with("**") && !line.trim().is_empty() {
            content.push(line);
        }
    }
    flush(&mut answer, state, &mut content);

    let missing = answer.missing_sections();
    if !missing.is_empty() {
        return Err(AppError::new(
            "INCOMPLETE_RESPONSE",
            "Model reply is missing required sections",
        )
        .with_details(format!("missing={}", missing.join(","))));
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_markdown_headers() {
        let reply = "Here is the report.\n\n\
            **SUMMARY OF FINDINGS:**\nRevenue grew 5%.\n\nAOV is 45.2.\n\
            **POLICY ALIGNMENT:**\nConsistent with revenue recognition policy.\n\
            **RECOMMENDED ACTIONS:**\n- Review pricing\n\
            **LIMITATIONS / CONFIDENCE:**\nModerate confidence.\n";
        let a = parse_sections(reply).expect("parse");
        assert_eq!(
            a,
            StructuredAnswer {
                summary_of_findings: "Revenue grew 5%.\nAOV is 45.2.".to_string(),
                policy_alignment: "Consistent with revenue recognition policy.".to_string(),
                recommended_actions: "- Review pricing".to_string(),
                limitations_confidence: "Moderate confidence.".to_string(),
            }
        );
    }

    #[test]
    fn numbered_headers_and_decoration_lines() {
        let reply = "1) Summary of Findings\n**bold note**\nA\n2) Policy Alignment\nB\n\
            3) Recommended Actions\nC\n4) Limitations / Confidence\nD";
        let a = parse_sections(reply).expect("parse");
        assert_eq!(a.summary_of_findings, "A");
        assert_eq!(a.limitations_confidence, "D");
    }

    #[test]
    fn limitations_needs_both_words() {
        let reply = "Summary of findings\nA\nPolicy alignment\nB\nRecommended actions\nC\nLimitations\nD";
        let err = parse_sections(reply).expect_err("incomplete");
        assert_eq!(err.code, "INCOMPLETE_RESPONSE");
        assert!(err.details.as_deref().unwrap_or("").contains("limitations_confidence"));
    }

    #[test]
    fn empty_or_headerless_reply_is_incomplete() {
        assert_eq!(parse_sections("").expect_err("empty").code, "INCOMPLETE_RESPONSE");
        assert_eq!(
            parse_sections("Just some prose without structure.")
                .expect_err("prose")
                .code,
            "INCOMPLETE_RESPONSE"
        );
    }

    #[test]
    fn header_with_no_body_does_not_erase_earlier_content() {
        let reply = "Summary of Findings\nA\nPolicy Alignment\nB\nRecommended Actions\nC\n\
            Limitations and Confidence\nD\nSummary of Findings\n";
        let a = parse_sections(reply).expect("parse");
        assert_eq!(a.summary_of_findings, "A");
    }
}
