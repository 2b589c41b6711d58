//! Prompt templates for the translation workflow.
//!
//! These are the external collaborator's contract: pure functions from
//! parameters to prompt text. The orchestration core treats them as opaque.

/// Tag the generation steps are asked to wrap their translation in. An
/// unclosed tag is the truncation signal.
pub const OUTPUT_TAG: &str = "translation";

pub fn translator_system(target_lang: &str, source_lang: &str, custom: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a literary translator working from {source_lang} into {target_lang}. \
         You translate complete works faithfully, preserving tone, register, rhythm, \
         and cultural nuance. You discuss your choices when asked, and when asked for \
         a translation you produce the entire text, never a summary or an excerpt."
    );
    if let Some(custom) = custom.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nAdditional instructions from the commissioner:\n");
        prompt.push_str(custom);
    }
    prompt
}

pub fn reviewer_system(target_lang: &str) -> String {
    format!(
        "You are an independent senior editor reviewing a {target_lang} translation. \
         You have no attachment to the translator's earlier decisions. Judge the text \
         on accuracy, completeness, naturalness, and consistency, and be specific: \
         quote the passages you criticize."
    )
}

pub fn analysis_prompt(source: &str) -> String {
    format!(
        "Here is the full source text to translate:\n\n{source}\n\n\
         Before translating anything, analyze this text: genre and register, \
         narrative voice, period and setting, stylistic devices, and the main \
         difficulties it will pose for translation."
    )
}

pub fn expression_prompt() -> String {
    "Explore the key expressions, idioms, and recurring phrases in the text. \
     For each, propose candidate renderings and note which best preserves the \
     original effect."
        .to_string()
}

pub fn cultural_prompt() -> String {
    "Discuss the cultural references, institutions, and allusions in the text. \
     Decide for each whether to domesticate, foreignize, or gloss, and explain \
     the choice."
        .to_string()
}

pub fn title_prompt() -> String {
    "Propose translations for the title and any chapter headings, and describe \
     the overall voice you intend to carry through the translation."
        .to_string()
}

pub fn first_draft_prompt(source: &str) -> String {
    format!(
        "Now translate the complete text. Apply everything we discussed. \
         Wrap the full translation, and nothing else, in <{OUTPUT_TAG}> tags.\n\n\
         Source text:\n\n{source}"
    )
}

pub fn self_critique_prompt() -> String {
    format!(
        "Critique your own draft: find mistranslations, awkward phrasing, lost \
         nuance, and inconsistent terminology. Then produce a fully revised \
         translation incorporating every fix, wrapped in <{OUTPUT_TAG}> tags."
    )
}

pub fn second_refinement_prompt() -> String {
    format!(
        "Read the revised translation once more as a native reader would. Smooth \
         whatever still reads as translated rather than written. Output the \
         complete refined translation in <{OUTPUT_TAG}> tags."
    )
}

pub fn final_translation_prompt(source: &str, prior_draft: &str) -> String {
    format!(
        "Perform a comprehensive final review. Compare the draft against the \
         source line by line: restore anything omitted, correct anything \
         mistranslated, and polish the prose. Output the complete final \
         translation in <{OUTPUT_TAG}> tags.\n\n\
         Source text:\n\n{source}\n\nCurrent draft:\n\n{prior_draft}"
    )
}

pub fn external_review_prompt(source: &str, translation: &str) -> String {
    format!(
        "Review this translation against its source. List concrete problems in \
         order of severity, quoting both texts.\n\n\
         Source text:\n\n{source}\n\nTranslation:\n\n{translation}"
    )
}

pub fn refinement_prompt(translation: &str, review: &str) -> String {
    format!(
        "Here is a translation and an independent editor's review of it. Apply \
         every justified criticism and output the complete refined translation \
         in <{OUTPUT_TAG}> tags.\n\n\
         Translation:\n\n{translation}\n\nEditor's review:\n\n{review}"
    )
}

pub fn continuation_prompt(anchor: &str) -> String {
    format!(
        "Your previous output was cut off. Continue the translation exactly \
         from this point, without repeating it and without any preamble:\n\n\
         {anchor}\n\n\
         Continue inside <{OUTPUT_TAG}> tags and close the tag when the \
         translation is complete."
    )
}

pub fn verifier_prompt(source: &str, candidate: &str) -> String {
    format!(
        "Compare this source text and its translation. Decide whether the \
         translation covers the entire source or stops early.\n\n\
         Respond with only a JSON object:\n\
         {{\"complete\": true|false, \
         \"last_translated_line\": \"<final line of the translation>\", \
         \"last_source_line\": \"<source line it corresponds to>\"}}\n\n\
         Source text:\n\n{source}\n\nTranslation:\n\n{candidate}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translator_system_includes_custom_instructions() {
        let prompt = translator_system("French", "English", Some("Keep names untranslated."));
        assert!(prompt.contains("French"));
        assert!(prompt.contains("Keep names untranslated."));

        let plain = translator_system("French", "English", None);
        assert!(!plain.contains("commissioner"));
    }

    #[test]
    fn generation_prompts_name_the_output_tag() {
        assert!(first_draft_prompt("src").contains("<translation>"));
        assert!(self_critique_prompt().contains("<translation>"));
        assert!(continuation_prompt("anchor line").contains("<translation>"));
    }
}
