//! Title, description and tag generation.
//!
//! Titles come from a fixed per-language template list, picked at random.
//! Descriptions come from one template per language. Sensitive words are
//! masked in both so the platform does not limit the video's reach.

use crate::models::{media::GeneratedMetadata, upload::Language};
use rand::{Rng, SeedableRng, rngs::StdRng};
use regex::{Captures, Regex};
use std::{
    collections::HashSet,
    sync::{LazyLock, Mutex},
};
use tracing::debug;

const HI_TITLES: [&str; 6] = [
    "{topic} की पूरी कहानी | सच्ची घटना",
    "{topic}: जिसने सबको हिला दिया",
    "{topic} का रहस्य | पूरा सच",
    "{topic} - एक चौंकाने वाली सच्ची कहानी",
    "{topic} केस: उस दिन क्या हुआ था?",
    "{topic} | अनसुलझी पहेली का सच",
];

const EN_TITLES: [&str; 6] = [
    "The Full Story of {topic} | True Crime",
    "{topic}: The Case That Shocked Everyone",
    "What Really Happened in {topic}?",
    "{topic} - A Shocking True Story",
    "{topic} Explained | The Complete Case",
    "The Mystery of {topic} | Untold Truth",
];

const HINGLISH_TITLES: [&str; 6] = [
    "{topic} Ki Poori Kahani | Sacchi Ghatna",
    "{topic}: Jisne Sabko Hila Diya",
    "{topic} Ka Rahasya | Poora Sach",
    "{topic} - Ek Chaunkane Wali Sacchi Kahani",
    "{topic} Case: Us Din Kya Hua Tha?",
    "{topic} | Ansuljhi Paheli Ka Sach",
];

const HI_DESCRIPTION: &str = "इस वीडियो में जानिए {topic} की पूरी कहानी।\n\n\
{summary}\n\n\
{topic} से जुड़े हर पहलू को हमने तथ्यों के साथ समझाया है।\n\
ऐसी ही सच्ची कहानियों के लिए चैनल को सब्सक्राइब करें।\n\n\
#truecrime #hindi #crimestory";

const EN_DESCRIPTION: &str = "In this video we cover the full story of {topic}.\n\n\
{summary}\n\n\
Every detail of {topic} is explained with the facts that are publicly known.\n\
Subscribe for more true stories like this one.\n\n\
#truecrime #crimestory #mystery";

const HINGLISH_DESCRIPTION: &str = "Is video mein jaaniye {topic} ki poori kahani.\n\n\
{summary}\n\n\
{topic} se jude har pehlu ko humne facts ke saath samjhaya hai.\n\
Aisi hi sacchi kahaniyon ke liye channel ko subscribe karein.\n\n\
#truecrime #hinglish #crimestory";

const COMMON_TAGS: [&str; 5] = [
    "true crime",
    "crime story",
    "real story",
    "mystery",
    "crime documentary",
];

/// Words the platform's ad policy penalises; masked wherever they appear as
/// whole words.
pub const RESTRICTED_WORDS: [&str; 10] = [
    "murder", "killed", "kill", "suicide", "rape", "blood", "dead", "death", "gun", "drugs",
];

static RESTRICTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = RESTRICTED_WORDS.join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("restricted word pattern")
});

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(topic|summary)\}").expect("placeholder pattern"));

/// Generates upload metadata from the form's topic and summary.
///
/// The random source is owned by the generator so tests can seed it.
pub struct MetadataGenerator {
    rng: Mutex<StdRng>,
}

impl Default for MetadataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic generator for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn generate(
        &self,
        topic: &str,
        summary: &str,
        language: Language,
        custom_tags: &[String],
    ) -> GeneratedMetadata {
        let topic = topic.trim();
        let summary = summary.trim();

        let titles = title_templates(language);
        let index = self.pick(titles.len());
        let title = mask_restricted(&fill(titles[index], topic, summary));
        let description = mask_restricted(&fill(description_template(language), topic, summary));
        let tags = build_tags(topic, language, custom_tags);

        debug!(
            language = %language,
            template = index,
            tag_count = tags.len(),
            "generated upload metadata"
        );

        GeneratedMetadata {
            title,
            description,
            tags,
            language,
        }
    }

    fn pick(&self, len: usize) -> usize {
        match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..len),
            Err(poisoned) => poisoned.into_inner().random_range(0..len),
        }
    }
}

fn title_templates(language: Language) -> &'static [&'static str; 6] {
    match language {
        Language::Hi => &HI_TITLES,
        Language::En => &EN_TITLES,
        Language::Hinglish => &HINGLISH_TITLES,
    }
}

fn description_template(language: Language) -> &'static str {
    match language {
        Language::Hi => HI_DESCRIPTION,
        Language::En => EN_DESCRIPTION,
        Language::Hinglish => HINGLISH_DESCRIPTION,
    }
}

fn language_tag(language: Language) -> &'static str {
    match language {
        Language::Hi => "hindi crime story",
        Language::En => "english crime story",
        Language::Hinglish => "hinglish crime story",
    }
}

/// Substitute placeholders in one pass so values containing `{topic}` or
/// `{summary}` are not expanded again.
fn fill(template: &str, topic: &str, summary: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "topic" => topic.to_string(),
            _ => summary.to_string(),
        })
        .into_owned()
}

/// Replace every restricted whole word with its first character followed by
/// one `*` per remaining character.
pub fn mask_restricted(text: &str) -> String {
    RESTRICTED_RE
        .replace_all(text, |caps: &Captures| mask_word(&caps[0]))
        .into_owned()
}

fn mask_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut masked = String::with_capacity(word.len());
            masked.push(first);
            masked.extend(chars.map(|_| '*'));
            masked
        }
        None => String::new(),
    }
}

fn build_tags(topic: &str, language: Language, custom_tags: &[String]) -> Vec<String> {
    let lowered = topic.to_lowercase();
    let topic_tags = (!lowered.is_empty()).then(|| [lowered.clone(), format!("{} case", lowered)]);
    let candidates = COMMON_TAGS
        .iter()
        .map(|t| t.to_string())
        .chain(custom_tags.iter().map(|t| t.trim().to_string()))
        .chain(topic_tags.into_iter().flatten())
        .chain([language_tag(language).to_string()]);

    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    for tag in candidates {
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}
