//! Polarity scoring for the sentiment pipeline.
//!
//! [`LexiconScorer`] is a rule-based scorer in the VADER family. Each word
//! carries a valence on a ±4 scale; the valences are adjusted by nearby
//! negations and intensity modifiers, weighted around a contrastive "but",
//! summed, and squashed into `[-1.0, 1.0]`:
//!
//! ```text
//! compound = sum / sqrt(sum² + 15)
//! ```
//!
//! Only the sign and rough magnitude matter downstream: [`Mood::from_score`]
//! buckets the compound score at ±0.3.

use crate::models::Mood;

/// Produces a polarity score in `[-1.0, 1.0]` for a piece of text.
pub trait SentimentScorer: Send + Sync {
    fn polarity(&self, text: &str) -> f64;

    fn mood(&self, text: &str) -> Mood {
        Mood::from_score(self.polarity(text))
    }
}

const NORMALIZATION_ALPHA: f64 = 15.0;
const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;
const CAPS_INCREMENT: f64 = 0.733;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
/// How far back a negation or booster still applies.
const LOOKBACK: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }
}

impl SentimentScorer for LexiconScorer {
    fn polarity(&self, text: &str) -> f64 {
        let raw: Vec<&str> = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
            .filter(|t| !t.is_empty())
            .collect();
        if raw.is_empty() {
            return 0.0;
        }
        let words: Vec<String> = raw.iter().map(|t| t.to_lowercase()).collect();
        let shouting = raw.iter().any(|t| is_all_caps(t)) && !raw.iter().all(|t| is_all_caps(t));

        let mut scored: Vec<(usize, f64)> = Vec::new();
        for (i, word) in words.iter().enumerate() {
            let Some(mut v) = valence(word) else {
                continue;
            };
            if shouting && is_all_caps(raw[i]) {
                v += CAPS_INCREMENT * v.signum();
            }

            for distance in 1..=LOOKBACK.min(i) {
                let prev = words[i - distance].as_str();
                if let Some(boost) = booster(prev) {
                    let fade = match distance {
                        1 => 1.0,
                        2 => 0.95,
                        _ => 0.9,
                    };
                    v += boost * fade * v.signum();
                }
            }
            let negated = (1..=LOOKBACK.min(i)).any(|d| is_negation(&words[i - d]));
            if negated {
                v *= NEGATION_SCALAR;
            }
            scored.push((i, v));
        }

        if let Some(pivot) = words.iter().position(|w| w == "but") {
            for (i, v) in scored.iter_mut() {
                if *i < pivot {
                    *v *= 0.5;
                } else if *i > pivot {
                    *v *= 1.5;
                }
            }
        }

        if scored.is_empty() {
            return 0.0;
        }
        let mut sum = scored.iter().fold(0.0, |acc, (_, v)| acc + v);
        let bangs = text.matches('!').count().min(MAX_EXCLAMATIONS) as f64;
        if sum > 0.0 {
            sum += bangs * EXCLAMATION_INCREMENT;
        } else if sum < 0.0 {
            sum -= bangs * EXCLAMATION_INCREMENT;
        }

        normalize(sum)
    }
}

fn normalize(sum: f64) -> f64 {
    let score = sum / (sum * sum + NORMALIZATION_ALPHA).sqrt();
    score.clamp(-1.0, 1.0)
}

fn is_all_caps(token: &str) -> bool {
    token.chars().any(|c| c.is_alphabetic())
        && token.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase())
}

fn is_negation(word: &str) -> bool {
    word.ends_with("n't")
        || matches!(
            word,
            "not" | "no" | "never" | "none" | "nothing" | "nobody" | "neither" | "nor"
                | "without" | "cannot" | "cant" | "dont" | "wont" | "isnt" | "aint"
                | "hardly" | "barely" | "rarely" | "seldom"
        )
}

fn booster(word: &str) -> Option<f64> {
    match word {
        "absolutely" | "completely" | "deeply" | "extremely" | "incredibly" | "really"
        | "so" | "such" | "totally" | "truly" | "very" | "utterly" | "especially"
        | "entirely" | "highly" | "hugely" | "most" | "particularly" | "quite" | "remarkably"
        | "terribly" | "too" | "unbelievably" | "fully" | "super" => Some(BOOSTER_INCREMENT),
        "almost" | "barely" | "hardly" | "kinda" | "kindof" | "less" | "little"
        | "marginally" | "occasionally" | "partly" | "slightly" | "somewhat" | "sorta"
        | "scarcely" => Some(-BOOSTER_INCREMENT),
        _ => None,
    }
}

/// Word valences on a ±4 scale.
fn valence(word: &str) -> Option<f64> {
    let v = match word {
        // Strongly positive
        "love" | "loved" | "loving" | "wonderful" | "amazing" | "fantastic" | "excellent"
        | "awesome" | "thrilled" | "ecstatic" | "joyful" | "delighted" | "adore" | "adored"
        | "perfect" | "lovely" | "incredible" | "superb" | "outstanding" | "overjoyed"
        | "elated" | "blissful" | "euphoric" | "marvelous" | "magnificent" => 3.0,
        "happy" | "great" | "glad" | "grateful" | "thankful" | "beautiful" | "brilliant"
        | "excited" | "proud" | "joy" | "blessed" | "happiness" | "cheerful" | "optimistic"
        | "inspired" | "lucky" | "fortunate" | "laugh" | "laughing" | "laughed" | "smile"
        | "smiling" | "smiled" | "celebrate" | "celebrating" | "success" | "successful"
        | "accomplished" | "appreciate" | "appreciated" | "treasure" | "beloved" => 2.7,
        "care" | "cares" | "cared" | "caring" | "friend" | "friends" | "friendly" | "trust"
        | "healing" | "healed" | "healthy" | "peace" | "positive" | "pleasant" | "satisfied"
        | "refreshed" | "energized" | "encouraged" | "welcome" | "win" | "won" | "hug"
        | "hugs" | "free" | "freedom" | "comfort" | "comforted" | "understood" | "accepted"
        | "valued" | "cherish" | "cherished" | "gentle" | "warm" | "interesting" | "amused" => 2.0,
        "good" | "hopeful" | "hope" | "calm" | "relaxed" | "peaceful" | "better" | "safe"
        | "confident" | "enjoy" | "enjoyed" | "fun" | "nice" | "pleased" | "relieved"
        | "support" | "supported" | "kind" | "best" | "strong" | "motivated" => 1.9,
        "okay" | "ok" | "fine" | "content" | "like" | "liked" | "helpful" | "improving"
        | "comfortable" | "rested" | "secure" | "thanks" | "thank" | "help" | "helped"
        | "helps" | "patient" | "ready" | "alright" | "easier" | "able" | "coping"
        | "manage" | "managed" | "progress" => 1.3,

        // Strongly negative
        "die" | "dies" | "died" | "dying" | "dead" | "death" | "kill" | "kills" | "killed"
        | "killing" | "suicide" | "murder" | "heartbroken" | "heartbreak" | "heartbreaking"
        | "abuse" | "abused" | "abusive" | "trauma" | "traumatic" | "traumatized" | "torture"
        | "tortured" | "agony" | "hell" => -3.2,
        "hate" | "hated" | "hopeless" | "worthless" | "suicidal" | "despair" | "miserable"
        | "devastated" | "terrible" | "horrible" | "awful" | "unbearable" => -2.7,
        "useless" | "pointless" | "meaningless" | "helpless" | "powerless" | "unloved"
        | "unwanted" | "rejected" | "abandoned" | "betrayed" | "disgusted" | "disgusting"
        | "humiliated" | "ruined" | "crushed" | "shattered" | "tragic" | "tragedy"
        | "sorrow" | "unhappy" | "depressing" | "suffering" | "suffer" | "suffered"
        | "loathe" | "hates" | "hating" | "cruel" | "nightmare" | "nightmares" | "dread"
        | "dreading" | "dreadful" | "panicking" | "frightened" | "fearful" | "anxiety"
        | "grieving" | "mourning" | "loneliness" | "isolated" | "desperate" | "trapped"
        | "weeping" | "sobbing" | "disaster" | "pathetic" | "stupid" | "ugly" | "hurts"
        | "painful" => -2.4,
        "depressed" | "depression" | "sad" | "angry" | "furious" | "anxious" | "panic"
        | "scared" | "terrified" | "afraid" | "lonely" | "alone" | "hurt" | "broken"
        | "worst" | "hurting" | "crying" | "cry" | "grief" | "ashamed" | "guilty" => -2.1,
        "stressed" | "stress" | "worried" | "worry" | "nervous" | "tired" | "exhausted"
        | "upset" | "bad" | "overwhelmed" | "frustrated" | "annoyed" | "fear"
        | "pain" | "sick" | "empty" | "numb" | "lost" | "struggling" | "struggle"
        | "stuck" | "fail" | "failed" | "failure" | "insecure" | "jealous" | "hard"
        | "disappointed" | "disappointing" | "regret" | "regrets" | "weak" | "mad"
        | "bitter" | "resent" | "embarrassed" | "shame" | "gloomy" | "tears" | "cried"
        | "ill" | "lose" | "losing" | "drained" | "irritated" => -1.8,
        "bored" | "meh" | "confused" | "uneasy" | "restless" | "difficult" | "problem"
        | "problems" | "tense" | "worse" | "sleepless" | "unsure" | "doubt" | "doubts"
        | "awkward" | "weird" | "lazy" | "bothered" | "concerned" | "pressure" => -1.2,
        _ => return None,
    };
    Some(v)
}
