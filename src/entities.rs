use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Per-invocation cache of entity-aware literal patterns.
///
/// For a literal character this produces an alternation matching the raw
/// character or any of its numeric HTML entity encodings: decimal and hex,
/// leading zeros allowed, trailing `;` optional, hex digits in either case.
/// Letters with distinct upper/lower codepoints get both codes, since the
/// surrounding patterns match case-insensitively on the raw form.
///
/// The cache lives for a single rewrite call and is dropped with it; it is
/// never promoted to shared state.
pub(crate) struct EntityPatterns {
    literals: HashMap<String, String>,
    chars: HashMap<char, String>,
}

impl EntityPatterns {
    pub(crate) fn new() -> Self {
        let mut literals = HashMap::new();
        // Pre-seeded specials. Space also covers &nbsp;.
        literals.insert(" ".to_string(), r"(?:\s|&nbsp;?|&#0*32;?|&#x0*20;?)".to_string());
        literals.insert("(".to_string(), r"(?:\(|&#0*40;?|&#x0*28;?)".to_string());
        literals.insert(")".to_string(), r"(?:\)|&#0*41;?|&#x0*29;?)".to_string());
        literals.insert(".".to_string(), r"(?:\.|&#0*46;?|&#x0*2e;?)".to_string());
        Self {
            literals,
            chars: HashMap::new(),
        }
    }

    /// Pattern matching `text` with every character optionally entity-encoded.
    ///
    /// The trailing `;` of an entity is optional. A digit directly after a
    /// semicolon-less entity would belong to the entity itself, but none of
    /// the literals fed through here are followed by a pattern piece that can
    /// start with a digit, so the optional `;` cannot cause a mid-entity
    /// match in context.
    pub(crate) fn literal(&mut self, text: &str) -> String {
        if let Some(pattern) = self.literals.get(text) {
            return pattern.clone();
        }
        let mut pattern = String::new();
        for ch in text.chars() {
            let lower = ch.to_ascii_lowercase();
            if let Some(sub) = self.chars.get(&lower) {
                pattern.push_str(sub);
                continue;
            }
            let mut alts = vec![regex::escape(&lower.to_string())];
            alts.push(format!("&#0*{};?", lower as u32));
            alts.push(format!("&#x0*{:x};?", lower as u32));
            let upper = lower.to_ascii_uppercase();
            if upper != lower {
                alts.push(format!("&#0*{};?", upper as u32));
                alts.push(format!("&#x0*{:x};?", upper as u32));
            }
            let sub = format!("(?:{})", alts.join("|"));
            self.chars.insert(lower, sub.clone());
            pattern.push_str(&sub);
        }
        self.literals.insert(text.to_string(), pattern.clone());
        pattern
    }
}

/// Replace entity-encoded `/` and `.` in a captured URL with the literal
/// character, leaving every other entity untouched.
///
/// The digit run is matched greedily, so `&#4690;` parses as codepoint 4690
/// and is preserved rather than being misread as `&#46` followed by `90;`.
pub(crate) fn decode_url_entities(value: &str) -> String {
    static ENTITY_RE: OnceLock<Regex> = OnceLock::new();
    let re = ENTITY_RE
        .get_or_init(|| Regex::new(r"&#(?:0*([0-9]+)|[xX]0*([0-9A-Fa-f]+));?").unwrap());

    re.replace_all(value, |caps: &Captures| {
        let code = if let Some(dec) = caps.get(1) {
            u32::from_str_radix(dec.as_str(), 10)
        } else {
            u32::from_str_radix(&caps[2], 16)
        };
        match code {
            Ok(46) => ".".to_string(),
            Ok(47) => "/".to_string(),
            _ => caps[0].to_string(),
        }
    })
    .into_owned()
}
