//! Deterministic intent rules.
//!
//! Rules are tried in a fixed order and the first match wins. Keyword
//! families are data tables; each keyword matches on word boundaries and
//! contributes `1 + len/50` to the live-trigger weight.

use std::sync::LazyLock;

use regex::Regex;

use super::{ClassificationResult, Intent, LiveType, Method};
use crate::patterns::{any_match, compile, compile_all};

/// Weighted trigger count at which a query goes to the web on its own.
pub const LIVE_WEIGHT_THRESHOLD: f64 = 2.0;

/// Inputs shorter than this (in characters) are trivial.
const TRIVIAL_CHARS: usize = 3;

/// Greeting-like inputs are only smalltalk when this short.
const SMALLTALK_MAX_WORDS: usize = 4;

static SMALLTALK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"^\s*(ciao|hey|hi|hello|salve|buongiorno|buonasera|buonanotte|grazie( mille)?|thanks|thank you|ok+|perfetto|grande|ci sei|sei online|come stai|how are you)\b",
    )
});

static META: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\bchi sei\b",
        r"\bcome ti chiami\b",
        r"\bcosa (sai|puoi) fare\b",
        r"\bche cosa (sai|puoi) fare\b",
        r"\bsei (un|una) (ia|ai|bot|intelligenza artificiale)\b",
        r"\bquali sono le tue (capacità|funzioni)\b",
        r"\bwho are you\b",
        r"\bwhat are you\b",
        r"\bwhat('s| is) your name\b",
        r"\bwhat can you do\b",
        r"\bare you (an ai|a bot|a robot)\b",
        r"\byour (capabilities|features)\b",
    ])
});

static TEMPORAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\bche or[ae] (è|e'?|sono)\b",
        r"\bche giorno (è|e'?)\b",
        r"\bche data (è|e'?)\b",
        r"\bquale giorno del\b",
        r"\bin che anno siamo\b",
        r"\bwhat time is it\b",
        r"\bwhat('s| is) the time\b",
        r"\bwhat day is (it|today)\b",
        r"\bwhat('s| is) (the|today's) date\b",
        r"\btoday's date\b",
    ])
});

static IMPERATIVE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"\b(scrivi|scrivimi|genera|crea|traduci|spiegami|spiega|correggi|riscrivi|aggiorna|ottimizza|refactor|fixa|implementa|programma|codice|write|translate|explain|rewrite|generate|create|implement|code|debug)\b",
    )
});

static SEARCH_VERB: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"\b(cerca|cercami|ricerca|verifica|controlla online|trova|trovami|search|verify|find|look up|google)\b",
    )
});

static URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r#"(?i)\bhttps?://[^\s<>"'{}|\\^`\[\]]+"#));

static WWW: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r#"(?i)\bwww\.[^\s<>"'{}|\\^`\[\]]+"#));

static READ_VERB: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"\b(leggi|leggimi|riassumi|riassunto|sintetizza|apri|read|summari[sz]e|summary|open|tl;?dr)\b")
});

static BARE_DOMAIN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)\b((?:[a-z0-9-]+\.)+(?:com|org|net|it|io|dev|gov|edu|info|co|uk|de|fr|es|eu|ai|app|news)\b(?:/[^\s]*)?)",
    )
});

static BIOGRAPHICAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\bchi (è|e'|era) ",
        r"\bbiografia\b",
        r"\bwho (is|was) ",
        r"\bbiography\b",
    ])
});

static DEFINITIONAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\b(che )?cos'? ?(è|e')",
        r"\bcosa (è|significa|vuol dire)\b",
        r"\bdefinizione\b",
        r"\bcome funziona\b",
        r"\bdove si trova\b",
        r"\bquando (è|fu) (stato|stata|nato|nata)\b",
        r"\bstoria d(i|el|ella)\b",
        r"\bdifferenza tra\b",
        r"\bperch[ée]\b",
        r"\bwhat (is|are|was|were) ",
        r"\bwhat does .+ mean\b",
        r"\bdefinition\b",
        r"\bhow does\b",
        r"\bwhere is\b",
        r"\bwhen was\b",
        r"\bhistory of\b",
        r"\bdifference between\b",
        r"\bwhy\b",
    ])
});

/// Trigger family. `Recency` carries no live type of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Weather,
    Price,
    Sports,
    Schedule,
    News,
    Recency,
}

impl Family {
    fn live_type(self) -> Option<LiveType> {
        match self {
            Self::Weather => Some(LiveType::Weather),
            Self::Price => Some(LiveType::Price),
            Self::Sports => Some(LiveType::Sports),
            Self::Schedule => Some(LiveType::Schedule),
            Self::News => Some(LiveType::News),
            Self::Recency => None,
        }
    }
}

const FAMILIES: &[(Family, &[&str])] = &[
    (
        Family::Weather,
        &[
            "meteo", "che tempo", "weather", "temperatura", "pioggia", "neve", "previsioni",
            "previsione", "nuvoloso", "temporale", "piove", "nevica", "fa caldo", "fa freddo",
            "forecast", "rain", "snow", "temperature",
        ],
    ),
    (
        Family::Price,
        &[
            // triggers
            "prezzo", "prezzi", "quotazione", "quanto vale", "quanto costa", "valore",
            "tasso di cambio", "cambio", "price", "exchange rate", "market cap",
            "capitalizzazione", "borsa",
            // assets
            "btc", "bitcoin", "eth", "ethereum", "solana", "xrp", "ripple", "cardano", "doge",
            "dogecoin", "bnb", "usdt", "tether", "usdc", "polkadot", "litecoin", "crypto",
            "eurusd", "eur/usd", "usd/eur", "gbpusd", "gbp/usd", "usdjpy", "usd/jpy", "forex",
            "oro", "gold", "xauusd", "argento", "silver", "petrolio", "oil", "brent", "wti",
            "azioni", "stock", "stocks", "shares", "aapl", "msft", "nvda", "tsla", "nasdaq",
            "dow jones", "s&p 500", "sp500", "ftse mib", "ftsemib", "dax", "nikkei",
        ],
    ),
    (
        Family::Sports,
        &[
            "risultato", "risultati", "score", "scores", "quanto è finita", "com'è finita",
            "chi ha vinto", "chi ha segnato", "gol", "classifica", "standings", "partita",
            "partite", "match", "milan", "inter", "juventus", "juve", "napoli", "roma", "lazio",
            "atalanta", "fiorentina", "real madrid", "barcellona", "barcelona", "psg",
            "liverpool", "chelsea", "arsenal", "bayern", "serie a", "premier league",
            "champions league", "champions", "europa league", "la liga", "bundesliga",
            "coppa italia", "world cup", "mondiali", "europei",
        ],
    ),
    (
        Family::Schedule,
        &[
            "orari", "orario", "a che ora", "quando gioca", "quando inizia", "quando parte",
            "what time", "schedule", "calendario", "prossima partita", "prossimo match",
            "gioca", "formula 1", "f1", "gran premio", "motogp", "prossima gara", "fomc",
            "riunione bce", "riunione fed",
        ],
    ),
    (
        Family::News,
        &[
            "ultime notizie", "notizie", "breaking news", "news", "ultime news", "novità",
            "aggiornamenti", "headline", "headlines", "latest news", "current events",
            "cosa è successo", "cosa succede", "cronaca", "attualità",
        ],
    ),
    (
        Family::Recency,
        &[
            "oggi", "stamattina", "stasera", "adesso", "ora", "domani", "ieri",
            "in tempo reale", "real time", "live", "ultimi", "ultime", "ultima ora",
            "attuale", "corrente", "in questo momento", "now", "today", "tonight", "tomorrow",
            "yesterday", "current", "latest", "right now",
        ],
    ),
];

static FAMILY_PATTERNS: LazyLock<Vec<(Family, Regex, f64)>> = LazyLock::new(|| {
    FAMILIES
        .iter()
        .flat_map(|(family, keywords)| {
            keywords.iter().filter_map(move |kw| {
                let weight = keyword_weight(kw);
                compile(&format!(r"\b{}\b", regex::escape(kw))).map(|re| (*family, re, weight))
            })
        })
        .collect()
});

/// Weight of one matched keyword. Longer keywords count for more.
pub fn keyword_weight(keyword: &str) -> f64 {
    1.0 + keyword.chars().count() as f64 / 50.0
}

/// Live-information triggers found in a query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LiveTriggers {
    /// Sum of matched keyword weights.
    pub weight: f64,
    /// Heaviest family with a live type; `News` when only recency words matched.
    pub live_type: Option<LiveType>,
}

impl LiveTriggers {
    /// Whether any trigger matched.
    pub fn any(&self) -> bool {
        self.weight > 0.0
    }
}

/// Lowercase, fold typographic apostrophes, strip `?!.,;:` and collapse
/// whitespace. URLs are extracted from the raw text, not from this form.
pub fn clean_for_matching(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| if matches!(c, '’' | '‘' | '`') { '\'' } else { c })
        .filter(|c| !matches!(c, '?' | '!' | '.' | ',' | ';' | ':'))
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Weighted trigger count over every keyword family.
pub fn live_triggers(cleaned: &str) -> LiveTriggers {
    let mut per_family: Vec<(Family, f64)> = Vec::new();
    for (family, re, weight) in FAMILY_PATTERNS.iter() {
        if re.is_match(cleaned) {
            match per_family.iter_mut().find(|(f, _)| f == family) {
                Some((_, w)) => *w += weight,
                None => per_family.push((*family, *weight)),
            }
        }
    }

    let weight: f64 = per_family.iter().map(|(_, w)| w).sum();
    let mut heaviest: Option<(Family, f64)> = None;
    for (family, w) in &per_family {
        if family.live_type().is_some() && heaviest.is_none_or(|(_, best)| *w > best) {
            heaviest = Some((*family, *w));
        }
    }
    let live_type = match heaviest {
        Some((family, _)) => family.live_type(),
        None if weight > 0.0 => Some(LiveType::News),
        None => None,
    };
    LiveTriggers { weight, live_type }
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '\'', '"'])
        .to_owned()
}

/// First URL in `text`: scheme-qualified first, then `www.` hosts (given an
/// `https://` scheme).
pub fn extract_url(text: &str) -> Option<String> {
    if let Some(m) = URL.as_ref().and_then(|re| re.find(text)) {
        return Some(trim_url(m.as_str()));
    }
    WWW.as_ref()
        .and_then(|re| re.find(text))
        .map(|m| format!("https://{}", trim_url(m.as_str())))
}

/// A bare domain accompanied by a read/summarise verb.
fn read_verb_domain(text: &str, cleaned: &str) -> Option<String> {
    let verb = READ_VERB.as_ref()?;
    if !verb.is_match(cleaned) {
        return None;
    }
    BARE_DOMAIN
        .as_ref()?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| format!("https://{}", trim_url(m.as_str())))
}

fn matches(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

fn decision(intent: Intent, confidence: f64, reason: &str) -> ClassificationResult {
    ClassificationResult {
        intent,
        confidence,
        reason: reason.to_owned(),
        method: Method::Rule,
        latency_ms: 0,
        url: None,
        live_type: None,
    }
}

/// Evergreen question: answered directly unless a live trigger co-occurs.
fn evergreen(triggers: LiveTriggers, reason: &str) -> ClassificationResult {
    if triggers.any() {
        ClassificationResult {
            live_type: triggers.live_type,
            ..decision(Intent::WebSearch, 0.88, &format!("{reason}_with_live_trigger"))
        }
    } else {
        decision(Intent::DirectAnswer, 0.92, reason)
    }
}

/// Classify `text` with the rule engine. Never fails.
pub fn classify(text: &str) -> ClassificationResult {
    let raw = text.trim();
    let cleaned = clean_for_matching(raw);

    if cleaned.chars().count() < TRIVIAL_CHARS {
        return decision(Intent::DirectAnswer, 0.95, "trivial_input");
    }
    if matches(&SMALLTALK, &cleaned) && cleaned.split(' ').count() <= SMALLTALK_MAX_WORDS {
        return decision(Intent::DirectAnswer, 0.95, "smalltalk");
    }
    if any_match(&META, &cleaned) {
        return decision(Intent::DirectAnswer, 1.0, "meta_capability");
    }
    if any_match(&TEMPORAL, &cleaned) {
        return decision(Intent::DirectAnswer, 1.0, "temporal_internal");
    }

    let url = extract_url(raw);
    let search_requested = matches(&SEARCH_VERB, &cleaned);
    if url.is_none() && !search_requested && matches(&IMPERATIVE, &cleaned) {
        return decision(Intent::DirectAnswer, 0.92, "task_imperative");
    }

    if let Some(url) = url.or_else(|| read_verb_domain(raw, &cleaned)) {
        return ClassificationResult {
            url: Some(url),
            ..decision(Intent::ReadUrl, 1.0, "url_detected")
        };
    }

    let triggers = live_triggers(&cleaned);
    if any_match(&BIOGRAPHICAL, &cleaned) {
        return evergreen(triggers, "biographical");
    }
    if any_match(&DEFINITIONAL, &cleaned) {
        return evergreen(triggers, "definitional");
    }
    if search_requested {
        return ClassificationResult {
            live_type: triggers.live_type,
            ..decision(Intent::WebSearch, 0.95, "explicit_search_request")
        };
    }
    if triggers.weight >= LIVE_WEIGHT_THRESHOLD {
        return ClassificationResult {
            live_type: triggers.live_type,
            ..decision(
                Intent::WebSearch,
                0.9,
                &format!("live_triggers:{:.2}", triggers.weight),
            )
        };
    }
    decision(Intent::DirectAnswer, 0.7, "default_safe")
}
