use crate::llm::{FactCandidate, SectionDraft};

/// Prompt pair for fact extraction over one chunk of source text.
pub fn fact_prompts(text: &str) -> (String, String) {
    let system = "You extract key learning points from academic text for presentation slides. \
                  Each statement must be a self-contained bullet point, concise enough to fit \
                  on one line of a slide (max ~20 words). Prefer plain, direct language a \
                  student can grasp at a glance. Return strict JSON only with key 'facts'."
        .to_string();

    let user = format!(
        "Extract up to 8 key points suitable as slide bullet points.\n\
         Rules:\n\
         - Each statement: max ~20 words, one core idea per bullet\n\
         - Start with the key noun or verb, not filler words\n\
         - Use active voice where possible\n\
         - Classify each as: definition, claim, method, result, limitation, or formula\n\n\
         Return JSON object: {{\"facts\":[{{\"statement\":string,\"fact_type\":string,\"importance\":number}}]}} \
         and nothing else.\n\n\
         Text:\n{text}"
    );

    (system, user)
}

/// Prompt pair for grouping facts into a two-level deck outline.
pub fn outline_prompts(facts: &[FactCandidate], language: &str) -> (String, String) {
    let fact_list = facts
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "[{i}] ({}, importance={:.2}) {}",
                f.fact_type.as_str(),
                f.importance,
                f.statement
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You are an expert instructional designer creating teaching slide decks. \
         Each subsection becomes ONE slide. Design for visual clarity and learning flow. \
         Respond in {language}. Return strict JSON only."
    );

    let user = format!(
        "Organize the following {count} facts into a presentation slide deck outline.\n\n\
         Slide design constraints:\n\
         - Each subsection = 1 slide. Max 6 bullets per slide (subsection).\n\
         - Ideal: 3-5 bullets per slide for readability.\n\
         - 3-8 sections total, each with 1-5 subsections (slides).\n\
         - Balance section sizes; avoid putting 80% of content in one section.\n\n\
         Learning flow:\n\
         - Order sections from foundational concepts to advanced/applied topics.\n\
         - Within each section, progress from overview to details to implications.\n\
         - Group related facts on the same slide; don't scatter related ideas.\n\
         - Section headings: short, topic-focused (2-5 words ideal).\n\
         - Subsection headings: describe the slide's key message.\n\n\
         Each subsection references facts by their [index] numbers.\n\
         Every fact index must appear in exactly one subsection.\n\n\
         Return JSON:\n\
         {{\"sections\":[{{\"heading\":string,\"summary_note\":string,\
         \"subsections\":[{{\"heading\":string,\"fact_indices\":[int,...]}}]}}]}}\n\n\
         Facts:\n{fact_list}",
        count = facts.len()
    );

    (system, user)
}

/// Prompt pair for writing speaker notes, one per subsection.
pub fn annotation_prompts(sections: &[SectionDraft], language: &str) -> (String, String) {
    let mut slide_lines = Vec::new();
    let mut total_subs = 0usize;
    for section in sections {
        for sub in &section.subsections {
            let bullets = sub
                .bullet_texts
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join("; ");
            slide_lines.push(format!(
                "[{total_subs}] Section: {} / Subsection: {} — Bullets: {bullets}",
                section.heading, sub.heading
            ));
            total_subs += 1;
        }
    }

    let system = format!(
        "You are a presentation coach writing speaker notes for teaching slides. \
         Your notes help the presenter explain each slide clearly and engage the audience. \
         Respond in {language}. Return strict JSON only."
    );

    let user = format!(
        "Write a speaker note for each of the following {total_subs} slides (subsections).\n\n\
         Speaker note guidelines:\n\
         - 1-3 sentences that the presenter reads or paraphrases while showing the slide.\n\
         - Start with the key takeaway or 'why this matters'.\n\
         - Include a concrete example, analogy, or question to engage the audience when possible.\n\
         - Use a conversational tone, as if speaking to students.\n\
         - If the slide has a formula, briefly explain what each variable means.\n\n\
         Return JSON:\n\
         {{\"annotations\":[{{\"subsection_index\":int,\"annotation\":string}}]}}\n\n\
         Slides:\n{}",
        slide_lines.join("\n")
    );

    (system, user)
}
