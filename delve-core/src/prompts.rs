//! Prompt templates for each structured completion.
//!
//! Each user prompt opens with a `TASK:` header naming the call site, and
//! ends with the exact JSON shape the caller parses.

use crate::research::ResearchGoal;

pub const TASK_FOLLOW_UP: &str = "TASK: FOLLOW_UP_QUESTIONS";
pub const TASK_GOAL: &str = "TASK: RESEARCH_GOAL";
pub const TASK_QUERIES: &str = "TASK: SEARCH_QUERIES";
pub const TASK_LEARNINGS: &str = "TASK: EXTRACT_LEARNINGS";
pub const TASK_EVALUATION: &str = "TASK: EVALUATE_ALIGNMENT";
pub const TASK_REPORT: &str = "TASK: FINAL_REPORT";

/// System prompt shared by every call.
pub fn system_prompt() -> String {
    let today = chrono::Utc::now().format("%Y-%m-%d");
    format!(
        "You are an expert research analyst. Today is {today}.\n\
         - The user is highly experienced; be detailed and precise.\n\
         - Prefer specific facts: names, numbers, dates, and sources.\n\
         - Flag speculation as such, and note when something may postdate your knowledge.\n\
         - Always answer with a single valid JSON object and nothing else."
    )
}

pub fn follow_up_questions_prompt(query: &str, max_questions: usize) -> String {
    format!(
        "{TASK_FOLLOW_UP}\n\n\
         A user wants to research the topic below. Ask up to {max_questions} clarifying \
         questions that would sharpen the research direction: scope, timeframe, audience, \
         depth, and the decisions the research should inform.\n\n\
         <topic>\n{query}\n</topic>\n\n\
         Respond with: {{\"questions\": [\"...\"]}}"
    )
}

pub fn goal_prompt(query: &str, qa_pairs: &str) -> String {
    let clarifications = if qa_pairs.is_empty() {
        "(none provided)".to_string()
    } else {
        qa_pairs.to_string()
    };
    format!(
        "{TASK_GOAL}\n\n\
         Turn the research request and the user's clarifications into a measurable goal.\n\n\
         <request>\n{query}\n</request>\n\n\
         <clarifications>\n{clarifications}\n</clarifications>\n\n\
         Produce one primary objective, 4-6 concrete success criteria that can be checked \
         against collected facts, and the specific questions the final report must answer.\n\n\
         Respond with: {{\"primary_objective\": \"...\", \"success_criteria\": [\"...\"], \
         \"specific_questions\": [\"...\"]}}"
    )
}

pub fn query_plan_prompt(
    context: &str,
    count: usize,
    recent_learnings: Option<&[String]>,
) -> String {
    let mut prompt = format!(
        "{TASK_QUERIES}\n\n\
         Generate up to {count} web search queries for the research context below. Each \
         query must target a different angle; order them from most to least useful.\n\n\
         <context>\n{}\n</context>\n",
        context.trim()
    );
    if let Some(learnings) = recent_learnings.filter(|l| !l.is_empty()) {
        prompt.push_str("\nAlready known (avoid re-searching these; go deeper or wider):\n");
        for learning in learnings {
            prompt.push_str(&format!("- {learning}\n"));
        }
    }
    prompt.push_str(
        "\nRespond with: {\"queries\": [{\"query\": \"...\", \"research_goal\": \"...\"}]}",
    );
    prompt
}

pub fn extraction_prompt(
    query: &str,
    contents: &str,
    max_learnings: usize,
    max_follow_ups: usize,
) -> String {
    format!(
        "{TASK_LEARNINGS}\n\n\
         Below are pages retrieved for the search query <query>{query}</query>.\n\
         Extract up to {max_learnings} distinct learnings. Each learning is one dense, \
         self-contained sentence with concrete entities, figures, and dates. Then suggest \
         up to {max_follow_ups} follow-up questions the pages leave open.\n\n\
         <contents>\n{contents}\n</contents>\n\n\
         Respond with: {{\"learnings\": [\"...\"], \"followUpQuestions\": [\"...\"]}}"
    )
}

pub fn evaluation_prompt(goal: &ResearchGoal, learnings_text: &str, epoch: usize) -> String {
    format!(
        "{TASK_EVALUATION}\n\n\
         Research epoch {epoch} has finished. Judge how well the collected learnings \
         satisfy the goal.\n\n\
         Primary objective: {}\n\n\
         Success criteria:\n{}\n\n\
         Specific questions:\n{}\n\n\
         <learnings>\n{learnings_text}\n</learnings>\n\n\
         List in criteria_met and questions_answered only items copied verbatim from the \
         lists above that the learnings fully satisfy. alignment_score is between 0.0 and \
         1.0. Set goal_achieved only if the score is at least 0.8 and at least 80% of both \
         lists are satisfied.\n\n\
         Respond with: {{\"alignment_score\": 0.0, \"criteria_met\": [\"...\"], \
         \"questions_answered\": [\"...\"], \"missing_aspects\": [\"...\"], \
         \"goal_achieved\": false, \"continue_research\": true, \
         \"next_research_directions\": [\"...\"]}}",
        goal.primary_objective,
        bullet_list(&goal.success_criteria),
        bullet_list(&goal.specific_questions),
    )
}

pub fn report_prompt(original_prompt: &str, learnings_text: &str) -> String {
    format!(
        "{TASK_REPORT}\n\n\
         Write a detailed, plain-text research report answering the request below, using \
         every relevant learning. Use upper-case section headings (EXECUTIVE SUMMARY, \
         KEY FINDINGS, ANALYSIS, CONCLUSIONS). No markdown. Do not list sources; they \
         are appended separately.\n\n\
         <request>\n{original_prompt}\n</request>\n\n\
         <learnings>\n{learnings_text}\n</learnings>\n\n\
         Respond with: {{\"reportText\": \"...\"}} (escape newlines as \\n)"
    )
}

/// Render items as `- item` lines.
pub fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
