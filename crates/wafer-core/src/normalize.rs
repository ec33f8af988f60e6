//! Deterministic lexical normalization of raw listing descriptions.
//!
//! Extracts stable textual hints (vendor, model, board partner, suffix,
//! VRAM, memory kind, connector counts) from a single description without
//! guessing or fuzzy matching. Pure functions of their input; safe to use in
//! unit tests and deterministic pipelines.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::chip::{MemoryKind, Vendor};

// ─── Folding ─────────────────────────────────────────────────────────────────

static CLEAN_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"[^A-Z0-9\-\+]+").unwrap());

/// Fold a description for deterministic parsing: uppercase, strip everything
/// but alphanumerics / `-` / `+`, collapse whitespace. This is the same fold
/// the fingerprint is computed over.
pub fn fold(text: &str) -> String {
  let upper = text.to_uppercase();
  let cleaned = CLEAN_RE.replace_all(&upper, " ");
  cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─── Patterns ────────────────────────────────────────────────────────────────

static VRAM_GB_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\b(\d{1,3})\s*GB\b").unwrap());
static VRAM_TOKEN_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d{1,3}G(B)?$").unwrap());
static MEMORY_KIND_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\b(GDDR6X|GDDR7|GDDR6)\b").unwrap());
static HDMI_COUNT_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\b(\d+)\s*X\s*HDMI\b").unwrap());
static DP_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\b(\d+)\s*X\s*(DP|DISPLAYPORT|DISPLAY\s*PORT)\b").unwrap()
});
static NUMERIC_TOKEN_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

static NVIDIA_MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\bRTX[\s\-]*([0-9]{3,4})(?:[\s\-]*(TI))?(?:[\s\-]*(SUPER))?\b")
    .unwrap()
});
static AMD_MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\bRX[\s\-]*([0-9]{3,4})(?:[\s\-]*(XTX|XT|GRE))?\b").unwrap()
});
static INTEL_MODEL_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"\bARC[\s\-]*([A-Z])[\s\-]*([0-9]{3,4})\b").unwrap());

static VENDOR_PATTERNS: LazyLock<[(Vendor, Regex); 3]> = LazyLock::new(|| {
  [
    (Vendor::Nvidia, Regex::new(r"\b(NVIDIA|GEFORCE|RTX)\b").unwrap()),
    (Vendor::Amd, Regex::new(r"\b(AMD|RADEON|RX)\b").unwrap()),
    (Vendor::Intel, Regex::new(r"\b(INTEL|ARC)\b").unwrap()),
  ]
});

const VENDOR_TOKENS: [&str; 6] =
  ["NVIDIA", "GEFORCE", "AMD", "RADEON", "INTEL", "ARC"];
const MEMORY_TOKENS: [&str; 3] = ["GDDR6", "GDDR6X", "GDDR7"];
const PORT_TOKENS: [&str; 5] = ["HDMI", "DP", "DISPLAYPORT", "DISPLAY", "PORT"];

/// Known board-partner brands with their token aliases. Matching is earliest
/// occurrence wins, exact word boundaries only.
const BOARD_PARTNER_ALIASES: [(&str, &[&str]); 13] = [
  ("ASUS", &["ASUS"]),
  ("GIGABYTE", &["GIGABYTE"]),
  ("MSI", &["MSI"]),
  ("SAPPHIRE", &["SAPPHIRE"]),
  ("POWERCOLOR", &["POWERCOLOR", "POWER COLOR"]),
  ("ASROCK", &["ASROCK", "AS ROCK"]),
  ("XFX", &["XFX"]),
  ("ACER", &["ACER"]),
  ("GAINWARD", &["GAINWARD"]),
  ("PALIT", &["PALIT"]),
  ("ZOTAC", &["ZOTAC"]),
  ("NVIDIA", &["NVIDIA"]),
  ("INTEL", &["INTEL"]),
];

struct PartnerPattern {
  canonical: &'static str,
  tokens:    Vec<&'static str>,
  pattern:   Regex,
}

static PARTNER_PATTERNS: LazyLock<Vec<PartnerPattern>> = LazyLock::new(|| {
  BOARD_PARTNER_ALIASES
    .into_iter()
    .flat_map(|(canonical, aliases)| {
      aliases.iter().copied().map(move |alias| {
        let tokens: Vec<&'static str> = alias.split(' ').collect();
        let joined = tokens
          .iter()
          .map(|t| regex::escape(t))
          .collect::<Vec<_>>()
          .join(r"\s+");
        PartnerPattern {
          canonical,
          tokens,
          pattern: Regex::new(&format!(r"\b{joined}\b")).unwrap(),
        }
      })
    })
    .collect()
});

// ─── Output ──────────────────────────────────────────────────────────────────

/// Normalized hints extracted from a listing description. Every field is a
/// hint: absent means "not explicitly stated", never "absent from the
/// product".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedListing {
  pub vendor:            Option<Vendor>,
  pub series:            Option<String>,
  pub model_name:        Option<String>,
  pub board_partner:     Option<String>,
  pub model_suffix:      Option<String>,
  pub vram_gb:           Option<u16>,
  pub memory_kind:       Option<MemoryKind>,
  pub hdmi_count:        Option<u8>,
  pub displayport_count: Option<u8>,
}

struct ModelHints {
  vendor:       Option<Vendor>,
  series:       Option<String>,
  model_name:   Option<String>,
  model_number: Option<String>,
  tokens:       HashSet<String>,
}

struct PartnerMatch {
  canonical: &'static str,
  tokens:    Vec<&'static str>,
}

// ─── Extraction ──────────────────────────────────────────────────────────────

fn parse_model(text: &str) -> ModelHints {
  if let Some(caps) = NVIDIA_MODEL_RE.captures(text) {
    let number = caps[1].to_owned();
    let mut tokens: HashSet<String> =
      ["RTX".to_owned(), number.clone()].into_iter().collect();
    let mut model_name = format!("RTX {number}");
    if caps.get(2).is_some() {
      tokens.insert("TI".to_owned());
      model_name.push_str(" Ti");
    }
    if caps.get(3).is_some() {
      tokens.insert("SUPER".to_owned());
      model_name.push_str(" SUPER");
    }
    let series =
      (number.len() >= 4).then(|| format!("GeForce RTX {}", &number[..2]));
    return ModelHints {
      vendor: Some(Vendor::Nvidia),
      series,
      model_name: Some(model_name),
      model_number: Some(number),
      tokens,
    };
  }

  if let Some(caps) = AMD_MODEL_RE.captures(text) {
    let number = caps[1].to_owned();
    let mut tokens: HashSet<String> =
      ["RX".to_owned(), number.clone()].into_iter().collect();
    let mut model_name = format!("RX {number}");
    if let Some(suffix) = caps.get(2) {
      tokens.insert(suffix.as_str().to_owned());
      model_name.push(' ');
      model_name.push_str(suffix.as_str());
    }
    let series =
      (number.len() >= 4).then(|| format!("Radeon RX {}000", &number[..1]));
    return ModelHints {
      vendor: Some(Vendor::Amd),
      series,
      model_name: Some(model_name),
      model_number: Some(number),
      tokens,
    };
  }

  if let Some(caps) = INTEL_MODEL_RE.captures(text) {
    let code = format!("{}{}", &caps[1], &caps[2]);
    let tokens: HashSet<String> =
      ["ARC".to_owned(), code.clone()].into_iter().collect();
    return ModelHints {
      vendor: Some(Vendor::Intel),
      series: None,
      model_name: Some(format!("ARC {code}")),
      model_number: Some(caps[2].to_owned()),
      tokens,
    };
  }

  ModelHints {
    vendor:       None,
    series:       None,
    model_name:   None,
    model_number: None,
    tokens:       HashSet::new(),
  }
}

/// Infer a vendor from general brand tokens when no model pattern matched.
/// Earliest occurrence in the text wins.
fn infer_vendor(text: &str) -> Option<Vendor> {
  VENDOR_PATTERNS
    .iter()
    .filter_map(|(vendor, pattern)| {
      pattern.find(text).map(|m| (m.start(), *vendor))
    })
    .min_by_key(|(start, _)| *start)
    .map(|(_, vendor)| vendor)
}

fn extract_board_partner(text: &str) -> Option<PartnerMatch> {
  PARTNER_PATTERNS
    .iter()
    .filter_map(|pp| pp.pattern.find(text).map(|m| (m.start(), pp)))
    .min_by_key(|(start, _)| *start)
    .map(|(_, pp)| PartnerMatch {
      canonical: pp.canonical,
      tokens:    pp.tokens.clone(),
    })
}

fn extract_vram_gb(text: &str) -> Option<u16> {
  VRAM_GB_RE
    .captures(text)
    .and_then(|caps| caps[1].parse().ok())
}

fn extract_memory_kind(text: &str) -> Option<MemoryKind> {
  MEMORY_KIND_RE
    .captures(text)
    .and_then(|caps| MemoryKind::parse(&caps[1]).ok())
}

/// Sum explicit connector counts (`"3x DP"`). Absent counts stay absent; an
/// explicit zero also collapses to absent.
fn extract_port_count(text: &str, pattern: &Regex) -> Option<u8> {
  let mut total: u16 = 0;
  let mut found = false;
  for caps in pattern.captures_iter(text) {
    found = true;
    if let Ok(n) = caps[1].parse::<u16>() {
      total = total.saturating_add(n);
    }
  }
  if !found || total == 0 {
    return None;
  }
  u8::try_from(total).ok()
}

/// Extract suffix tokens from the pre-comma head of the listing, dropping
/// vendor/model/partner/spec tokens so only the board family name remains.
fn extract_model_suffix(
  head: &str,
  partner: Option<&PartnerMatch>,
  model: &ModelHints,
) -> Option<String> {
  let mut remove: HashSet<&str> = VENDOR_TOKENS.into_iter().collect();
  for token in &model.tokens {
    remove.insert(token);
  }
  if let Some(p) = partner {
    for token in &p.tokens {
      remove.insert(token);
    }
  }

  let model_number = model.model_number.as_deref().unwrap_or("");
  let filtered: Vec<&str> = head
    .split_whitespace()
    .filter(|token| {
      !remove.contains(token)
        && !MEMORY_TOKENS.contains(token)
        && !PORT_TOKENS.contains(token)
        && !NUMERIC_TOKEN_RE.is_match(token)
        && !VRAM_TOKEN_RE.is_match(token)
        && !(!model_number.is_empty() && token.contains(model_number))
    })
    .collect();

  if filtered.is_empty() {
    None
  } else {
    Some(filtered.join(" "))
  }
}

/// Normalize a raw listing description into lexical hints.
pub fn normalize(description: &str) -> NormalizedListing {
  if description.trim().is_empty() {
    return NormalizedListing::default();
  }

  let name_clean = fold(description);
  let head_raw = description.split(',').next().unwrap_or(description);
  let head_clean = fold(head_raw);

  let model = parse_model(&name_clean);
  let vendor = model.vendor.or_else(|| infer_vendor(&name_clean));

  let partner = extract_board_partner(&head_clean);

  let model_suffix = if model.model_name.is_some() {
    extract_model_suffix(&head_clean, partner.as_ref(), &model)
  } else {
    None
  };

  NormalizedListing {
    vendor,
    series: model.series,
    model_name: model.model_name,
    board_partner: partner.map(|p| p.canonical.to_owned()),
    model_suffix,
    vram_gb: extract_vram_gb(&name_clean),
    memory_kind: extract_memory_kind(&name_clean),
    hdmi_count: extract_port_count(&name_clean, &HDMI_COUNT_RE),
    displayport_count: extract_port_count(&name_clean, &DP_COUNT_RE),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
