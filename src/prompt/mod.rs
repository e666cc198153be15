use crate::core::config::PromptSettings;
use crate::retrieval::RetrievalResult;

/// Context block used when the index has nothing to offer.
pub const FALLBACK_CONTEXT: &str =
    "No specific verse found, please answer based on general Gita teachings.";

const RESPONSE_STEPS: [&str; 4] = [
    "1. Start with empathy, acknowledging the user's feelings.",
    "2. Gently introduce the wisdom from the provided verse, explaining its meaning in a modern, relatable context.",
    "3. Guide the user to reflect on their situation through the lens of this wisdom.",
    "4. Conclude your response by quoting the full English verse text and its reference. Do not add any extra commentary after quoting the verse.",
];

/// Fills the fixed generation template. Output depends only on the inputs
/// and the composer's configured names.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    persona_name: String,
    corpus_name: String,
}

impl PromptComposer {
    pub fn new(settings: &PromptSettings) -> Self {
        Self {
            persona_name: settings.persona_name.clone(),
            corpus_name: settings.corpus_name.clone(),
        }
    }

    pub fn persona_name(&self) -> &str {
        &self.persona_name
    }

    pub fn context_block(&self, retrieval: &RetrievalResult) -> String {
        match retrieval {
            RetrievalResult::Found { passage, .. } => format!(
                "Relevant Verse (From {}, Chapter {}, Verse {}): \"{}\"",
                self.corpus_name, passage.chapter, passage.verse, passage.primary_translation
            ),
            RetrievalResult::NotFound => FALLBACK_CONTEXT.to_string(),
        }
    }

    pub fn compose(&self, user_query: &str, retrieval: &RetrievalResult) -> String {
        let persona = format!(
            "You are {name}, a compassionate, wise, and spiritual guide based on the teachings of the {corpus}. \
             Your persona is calm, empathetic, and you never give direct solutions, but rather philosophical insights. \
             You are not preachy or robotic.",
            name = self.persona_name,
            corpus = self.corpus_name,
        );

        let mut prompt = String::new();
        prompt.push_str(&persona);
        prompt.push('\n');
        prompt.push_str(&format!(
            "A user is asking for guidance. Their question is: \"{}\"\n",
            user_query
        ));
        prompt.push_str(&format!(
            "Here is the most relevant verse from the {} to guide your response:\n",
            self.corpus_name
        ));
        prompt.push_str(&self.context_block(retrieval));
        prompt.push_str("\n\nYour task is to provide a response that follows these steps:\n");
        for step in RESPONSE_STEPS {
            prompt.push_str(step);
            prompt.push('\n');
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::testing::passage;

    fn composer() -> PromptComposer {
        PromptComposer::new(&PromptSettings::default())
    }

    fn found_2_47() -> RetrievalResult {
        let mut verse = passage("2.47");
        verse.chapter = 2;
        verse.verse = 47;
        verse.primary_translation = "T".to_string();
        RetrievalResult::Found {
            document: verse.searchable_text(),
            passage: verse,
            score: 0.8,
        }
    }

    #[test]
    fn found_context_quotes_translation_verbatim() {
        let prompt = composer().compose("I feel anxious about failing", &found_2_47());

        assert!(prompt.contains(
            "Relevant Verse (From Bhagavad Gita, Chapter 2, Verse 47): \"T\""
        ));
        assert!(prompt.contains("Their question is: \"I feel anxious about failing\""));
        assert!(prompt.starts_with("You are GitaGPT, a compassionate"));
    }

    #[test]
    fn fallback_has_no_verse_reference() {
        let composer = composer();
        assert_eq!(composer.context_block(&RetrievalResult::NotFound), FALLBACK_CONTEXT);

        let prompt = composer.compose("what is peace?", &RetrievalResult::NotFound);
        assert!(prompt.contains(FALLBACK_CONTEXT));
        assert!(!prompt.contains("Chapter"));
        assert!(!prompt.contains("Verse ("));
    }

    #[test]
    fn composition_is_deterministic() {
        let composer = composer();
        let retrieval = found_2_47();
        assert_eq!(
            composer.compose("same question", &retrieval),
            composer.compose("same question", &retrieval)
        );
    }

    #[test]
    fn response_steps_appear_in_order() {
        let prompt = composer().compose("q", &RetrievalResult::NotFound);
        let positions: Vec<usize> = RESPONSE_STEPS
            .iter()
            .map(|step| prompt.find(step).expect("step present"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn configured_names_replace_defaults() {
        let composer = PromptComposer::new(&PromptSettings {
            persona_name: "Sage".to_string(),
            corpus_name: "Tao Te Ching".to_string(),
        });
        let prompt = composer.compose("q", &found_2_47());
        assert!(prompt.starts_with("You are Sage,"));
        assert!(prompt.contains("(From Tao Te Ching, Chapter 2, Verse 47)"));
    }
}
