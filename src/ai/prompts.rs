use crate::models::RuleSet;

/// Human request that opens every sorting session
pub fn build_session_request(target: &str) -> String {
    format!("Sort this file: {}", target)
}

/// Analysis summary consumed by every reasoning turn
pub fn build_analysis_summary(file_name: &str, summary: &str, memory_hints: &str) -> String {
    format!(
        "FILE: {}\nSUMMARY: {}\nMEMORY HINTS: {}",
        file_name, summary, memory_hints
    )
}

/// System prompt for the decision loop
pub fn build_sorting_system_prompt(rule_set: &RuleSet, analysis_summary: &str) -> String {
    format!(
        r#"You are the Sorterra Agent, a document sorting assistant for "{name}".

RULES (in priority order):
{rules}

CURRENT ANALYSIS:
{analysis}

DECISION TASK:
- Decide where the file belongs using the RULES and the CURRENT ANALYSIS, then call move_file.
- MEMORY HINTS show where similar documents were sorted before. Follow them when they agree with the RULES; when they conflict, the RULES win.
- Use folder_tree (or list_contents for one folder) to reuse existing folders instead of inventing near-duplicates.
- Only rename when a rule asks for it, and do it after the move using the path move_file returned.
- If a tool reports FAILED, adjust and retry with different arguments or explain why the file cannot be sorted.
- When you are done, reply with a one-line summary of what happened to the file and no tool calls."#,
        name = rule_set.name,
        rules = rule_set.render(),
        analysis = analysis_summary,
    )
}

/// Default analyzer task
pub const DEFAULT_ANALYSIS_TASK: &str =
    "extract: document type, project identifiers, key entities, 2-sentence overview";

/// System prompt for the recursive analyzer's planner
pub fn build_analyzer_system_prompt(task: &str, content_chars: usize, max_summary_chars: usize) -> String {
    format!(
        r#"You analyze a document that is too large to read in one pass ({chars} characters).
You cannot see the document directly. Use the tools:
- content_length: size in characters and lines
- split_content: split the document into chunks (strategy: paragraphs, lines or fixed)
- summarize_chunks: summarize chunks in parallel with an instruction you choose
- peek: read a short slice of the raw document

TASK: {task}

Work in as few steps as possible: split, summarize, then synthesize.
Your final answer (no tool calls) must be a JSON object:
{{"document_type": "...", "project_identifiers": ["..."], "key_entities": ["..."], "overview": "..."}}
Keep it under {max} characters."#,
        chars = content_chars,
        task = task,
        max = max_summary_chars,
    )
}

/// Prompt for one per-chunk sub-query
pub fn build_chunk_prompt(instruction: &str, index: usize, total: usize, chunk: &str) -> String {
    format!(
        "{}\n\nThis is chunk {} of {} of a larger document. Answer in at most 5 sentences. Say 'nothing relevant' if the chunk has nothing for the instruction.\n\n---\n{}\n---",
        instruction,
        index + 1,
        total,
        chunk
    )
}

pub const CHUNK_SYSTEM_PROMPT: &str =
    "You summarize document excerpts precisely. Never invent facts that are not in the excerpt.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_contains_rules_and_analysis() {
        let rules = RuleSet::default();
        let summary = build_analysis_summary(
            "invoice.txt",
            "[TXT]: INVOICE #1024",
            "No high-confidence matches in memory.",
        );
        let prompt = build_sorting_system_prompt(&rules, &summary);

        assert!(prompt.contains("ACME Corp Enterprise Sort"));
        assert!(prompt.contains("Finance/Invoices/[VendorName]"));
        assert!(prompt.contains("FILE: invoice.txt\nSUMMARY: [TXT]: INVOICE #1024\nMEMORY HINTS: No high-confidence"));
        assert!(prompt.contains("the RULES win"));
    }

    #[test]
    fn test_chunk_prompt_is_one_based() {
        let prompt = build_chunk_prompt("list vendors", 0, 3, "Vendor: AWS");
        assert!(prompt.contains("chunk 1 of 3"));
        assert!(prompt.ends_with("Vendor: AWS\n---"));
    }
}
