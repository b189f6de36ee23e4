//! Instruction payloads sent to the code-generation service

use crate::heal::context::RepairManifestEntry;

/// Constraints every repair must respect. Also rendered into the
/// human-readable report so a reviewer sees the same rules.
pub const REPAIR_RULES: &[&str] = &[
    "Only fix the broken locators listed below. Change nothing else.",
    "Do not modify method signatures, imports, class structure, control flow, assertions or business logic.",
    "Never introduce hard waits (waitForTimeout, sleeps, fixed delays) and never increase timeout values.",
    "Prefer getByRole(), getByLabel() and getByTestId() lookups over raw CSS or XPath selectors.",
    "On a strict mode violation make the locator more specific so it matches exactly one element.",
    "On a timeout improve the locator, not the timeout.",
];

pub fn system_prompt() -> String {
    let mut prompt = String::from(
        "You are an expert end-to-end test automation engineer.\n\
         Your job is to repair stale element locators in Page Object source files.\n\nSTRICT RULES:\n",
    );
    for (i, rule) in REPAIR_RULES.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, rule));
    }
    prompt.push_str(&format!(
        "{}. Return ONLY the complete updated file content as raw source code, without markdown fences or explanations.\n",
        REPAIR_RULES.len() + 1
    ));
    prompt
}

pub fn file_repair_prompt(entry: &RepairManifestEntry) -> String {
    let mut prompt = format!(
        "The Page Object {} has {} broken locator(s) that cause test failures.\n\n",
        entry.page_object_file,
        entry.broken_locators.len()
    );

    for (i, (locator, error)) in entry
        .broken_locators
        .iter()
        .zip(entry.errors.iter())
        .enumerate()
    {
        prompt.push_str(&format!(
            "BROKEN LOCATOR {}: {}\nERROR:\n{}\n\n",
            i + 1,
            locator,
            error.trim()
        ));
    }

    prompt.push_str(&format!(
        "CURRENT FILE ({}):\n```\n{}\n```\n\n\
         Fix every broken locator above and return the complete updated file.\n\
         Return ONLY raw source code, no markdown fences or explanations.",
        entry.page_object_file,
        entry.page_object_content.trim_end()
    ));
    prompt
}

pub fn live_system_prompt() -> String {
    "You are an expert end-to-end test automation engineer.\n\
     You replace a single broken element locator with one that matches the given page markup.\n\
     Return only the new locator expression, with no quotes, markdown or explanation."
        .to_string()
}

/// `dom` must already be cut to the configured budget.
pub fn live_replacement_prompt(broken: &str, dom: &str) -> String {
    format!(
        "Broken locator:\n{}\n\nRelevant DOM:\n{}\n\n\
         Prefer getByRole, getByText, data-testid, aria-label and role based lookups.\n\
         Avoid brittle CSS chains.\n\
         Return only the locator.",
        broken, dom
    )
}
