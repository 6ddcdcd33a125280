use crate::types::{Candidate, ItemKind};

/// Build the fix prompt handed to whichever backend the router selects.
///
/// All backends receive the same composition so behavior stays consistent
/// across failover: what the item is, what to do, and how to report.
pub fn fix_prompt(candidate: &Candidate) -> String {
    let mut s = String::new();

    match candidate.id.kind {
        ItemKind::Issue => {
            s.push_str(&format!(
                "Work item: issue #{} — {}\n\n",
                candidate.id.number, candidate.title
            ));
            s.push_str(
                "Read the issue with `gh issue view` to get the full description and \
                 discussion, then investigate the codebase and implement a fix on a \
                 dedicated branch.",
            );
        }
        ItemKind::ChangeRequest => {
            s.push_str(&format!(
                "Work item: pull request #{} — {}\n\n",
                candidate.id.number, candidate.title
            ));
            s.push_str(
                "Read the pull request with `gh pr view` and its review comments with \
                 `gh pr view --comments`, then address the requested changes on the \
                 existing branch.",
            );
        }
    }

    s.push_str(
        "\n\nRun the project's tests before finishing. When done, summarize what you \
         changed and why in 2-4 sentences. If the item cannot be fixed automatically, \
         say so explicitly and explain what is blocking.",
    );

    s
}
