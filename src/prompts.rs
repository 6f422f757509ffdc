//! Default role instructions and human-gate banners

pub const WRITER: &str = "You are a content writer. Create engaging, well-structured content based on \
requirements. Keep responses concise, under 100 words. Always end with \"READY_FOR_REVIEW\" when \
presenting content.";

pub const EDITOR: &str = "You are a content editor. Review content for clarity and quality. Provide \
constructive feedback and suggestions, under 100 words. End with \"CONTENT_OK\" if satisfactory, or \
\"NEEDS_REVISION\" with feedback.";

pub const REVIEWER: &str = "You are a quality reviewer. Check content for accuracy, completeness, and \
standards. Provide clear feedback, under 100 words. End with \"QUALITY_OK\" if acceptable, or \
\"NEEDS_IMPROVEMENT\" with issues.";

pub const CONTENT_SUMMARY: &str = "Summarize the content creation process and provide the final \
content. Keep the response clear and concise, under 50 words.";

pub const QUALITY_SUMMARY: &str = "Summarize the quality review process and provide final approval \
status. Keep the response clear and concise, under 50 words.";

pub const CONTENT_GATE: &str = "\
==================================================
 HUMAN INPUT - Content Team
==================================================
Options:
1. Type 'APPROVE' to approve
2. Provide feedback for improvements
--------------------------------------------------";

pub const QUALITY_GATE: &str = "\
==================================================
 HUMAN INPUT - Quality Team
==================================================
Options:
1. Type 'QUALITY_APPROVED' to approve
2. Provide quality feedback
--------------------------------------------------";

pub const PROJECT_GATE: &str = "\
============================================================
 HUMAN INPUT - Outer Team Coordination
============================================================
Options:
1. Type 'FINAL_APPROVAL' for final approval
2. Type 'REJECT_OUTPUT' to reject and rework
3. Provide coordination feedback
------------------------------------------------------------";

/// Banner for gates configured without one
pub fn generic_gate(name: &str) -> String {
    format!("HUMAN INPUT - {name}\nProvide your response to continue.")
}
