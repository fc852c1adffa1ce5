//! Reads an earnings announcement datetime off an IR page.
//!
//! Rule-based extraction runs first over row-level text blocks near
//! earnings keywords. The LLM is consulted only when no rule matches and
//! the page did not explicitly mark the datetime as undetermined.

use std::sync::{Arc, LazyLock};

use chrono::{NaiveDate, NaiveTime};
use kabucal_core::{CompanyCode, EarningsInfo, ParseConfidence};
use regex::Regex;

use crate::fetch::PageFetcher;
use crate::html::{flatten_blocks, page_text};
use crate::llm::LlmCapability;

const MAX_CONTEXTS: usize = 20;
const MAX_LLM_CONTEXTS: usize = 10;

const EARNINGS_KEYWORDS: [&str; 10] = [
    "決算発表",
    "決算発表予定",
    "決算短信",
    "四半期決算",
    "本決算",
    "業績発表",
    "決算日",
    "決算説明会",
    "earnings",
    "financial results",
];

const UNDETERMINED_KEYWORDS: [&str; 5] = ["未定", "未確定", "調整中", "tbd", "undetermined"];

#[derive(Debug, Clone, Copy)]
enum Era {
    Gregorian,
    Reiwa,
    Heisei,
}

impl Era {
    fn to_gregorian(self, year: i32) -> i32 {
        match self {
            Era::Gregorian => year,
            Era::Reiwa => 2018 + year,
            Era::Heisei => 1988 + year,
        }
    }
}

static DATE_PATTERNS: LazyLock<Vec<(Regex, Era)>> = LazyLock::new(|| {
    [
        (r"(\d{4})年\s*(\d{1,2})月\s*(\d{1,2})日", Era::Gregorian),
        (r"(\d{4})/(\d{1,2})/(\d{1,2})", Era::Gregorian),
        (r"(\d{4})-(\d{1,2})-(\d{1,2})", Era::Gregorian),
        (r"(\d{4})\.(\d{1,2})\.(\d{1,2})", Era::Gregorian),
        (r"令和\s*(元|\d{1,2})年\s*(\d{1,2})月\s*(\d{1,2})日", Era::Reiwa),
        (r"平成\s*(元|\d{1,2})年\s*(\d{1,2})月\s*(\d{1,2})日", Era::Heisei),
    ]
    .into_iter()
    .map(|(pattern, era)| (Regex::new(pattern).expect("valid date regex"), era))
    .collect()
});

#[derive(Debug, Clone, Copy)]
enum Meridiem {
    TwentyFour,
    Pm,
    Am,
}

static TIME_PATTERNS: LazyLock<Vec<(Regex, Meridiem)>> = LazyLock::new(|| {
    [
        (r"(\d{1,2}):(\d{2})", Meridiem::TwentyFour),
        (r"午後\s*(\d{1,2})時\s*(\d{1,2})分", Meridiem::Pm),
        (r"午後\s*(\d{1,2})時", Meridiem::Pm),
        (r"午前\s*(\d{1,2})時\s*(\d{1,2})分", Meridiem::Am),
        (r"午前\s*(\d{1,2})時", Meridiem::Am),
        (r"(\d{1,2})時\s*(\d{1,2})分", Meridiem::TwentyFour),
        (r"(\d{1,2})時", Meridiem::TwentyFour),
    ]
    .into_iter()
    .map(|(pattern, meridiem)| (Regex::new(pattern).expect("valid time regex"), meridiem))
    .collect()
});

/// Result of the rule-based pass over one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Found(EarningsInfo),
    /// Every earnings-keyword context carried an undetermined marker.
    Undetermined,
    /// Nothing matched. Carries the contexts for the LLM fallback.
    NoMatch { contexts: Vec<String> },
}

/// Rule-then-LLM datetime extraction for IR pages.
#[derive(Clone)]
pub struct IrParser {
    llm: Option<Arc<dyn LlmCapability>>,
    date_only_time: NaiveTime,
}

impl IrParser {
    /// `date_only_time` is the placeholder time attached to results where
    /// the page gave a date but no time.
    #[must_use]
    pub fn new(llm: Option<Arc<dyn LlmCapability>>, date_only_time: NaiveTime) -> Self {
        Self {
            llm,
            date_only_time,
        }
    }

    /// Fetches `url` and extracts the announcement datetime for `code`.
    /// Contexts dated on `target` are preferred when given.
    pub async fn parse(
        &self,
        fetcher: &PageFetcher,
        url: &str,
        code: &CompanyCode,
        target: Option<NaiveDate>,
    ) -> Option<EarningsInfo> {
        let html = match fetcher.fetch_text(url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::debug!(code = %code, url, error = %e, "IR page fetch failed");
                return None;
            }
        };
        self.parse_html(&html, code, target).await
    }

    pub async fn parse_html(
        &self,
        html: &str,
        code: &CompanyCode,
        target: Option<NaiveDate>,
    ) -> Option<EarningsInfo> {
        match extract_rule_based(html, code, target, self.date_only_time) {
            RuleOutcome::Found(info) => {
                tracing::debug!(code = %code, datetime = ?info.datetime, "IR datetime matched by rule");
                Some(info)
            }
            RuleOutcome::Undetermined => {
                tracing::debug!(code = %code, "IR page marks announcement as undetermined");
                None
            }
            RuleOutcome::NoMatch { contexts } => self.llm_fallback(html, code, &contexts).await,
        }
    }

    async fn llm_fallback(
        &self,
        html: &str,
        code: &CompanyCode,
        contexts: &[String],
    ) -> Option<EarningsInfo> {
        let llm = self.llm.as_ref()?;

        let input = if contexts.is_empty() {
            page_text(html)
        } else {
            contexts
                .iter()
                .take(MAX_LLM_CONTEXTS)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n")
        };

        let datetime = llm
            .extract_datetime(&input, &format!("stock code {code}"))
            .await?;
        let has_exact_time = datetime.time() != NaiveTime::MIN;
        let datetime = if has_exact_time {
            datetime
        } else {
            datetime.date().and_time(self.date_only_time)
        };

        tracing::debug!(code = %code, datetime = %datetime, "IR datetime extracted by LLM");
        Some(EarningsInfo {
            datetime: Some(datetime),
            confidence: ParseConfidence::Low,
            has_exact_time,
        })
    }
}

/// Rule-based pass. The first context with both date and time wins; failing
/// that, the first date-only context with `placeholder` as its time.
/// With a `target`, contexts dated before it are ignored and contexts on it
/// are preferred.
pub fn extract_rule_based(
    html: &str,
    code: &CompanyCode,
    target: Option<NaiveDate>,
    placeholder: NaiveTime,
) -> RuleOutcome {
    let blocks: Vec<String> = flatten_blocks(html)
        .iter()
        .map(|b| normalize_width(b))
        .collect();
    let (contexts, keyword_count) = earnings_contexts(&blocks, code);

    let mut matches = Vec::new();
    let mut undetermined_keyword_contexts = 0;
    for (idx, context) in contexts.iter().enumerate() {
        if has_undetermined_marker(context) {
            if idx < keyword_count {
                undetermined_keyword_contexts += 1;
            }
            continue;
        }
        if let Some(date) = parse_date(context) {
            matches.push((date, parse_time(context)));
        }
    }

    // Rows for quarters already announced are history, not a signal.
    if let Some(t) = target {
        matches.retain(|(d, _)| *d >= t);
    }

    let preferred = target.and_then(|t| {
        let on_target: Vec<_> = matches.iter().copied().filter(|(d, _)| *d == t).collect();
        pick(&on_target, placeholder)
    });
    if let Some(info) = preferred.or_else(|| pick(&matches, placeholder)) {
        return RuleOutcome::Found(info);
    }

    if keyword_count > 0 && undetermined_keyword_contexts == keyword_count {
        return RuleOutcome::Undetermined;
    }

    RuleOutcome::NoMatch { contexts }
}

fn pick(matches: &[(NaiveDate, Option<NaiveTime>)], placeholder: NaiveTime) -> Option<EarningsInfo> {
    if let Some((date, Some(time))) = matches.iter().find(|(_, t)| t.is_some()) {
        return Some(EarningsInfo {
            datetime: Some(date.and_time(*time)),
            confidence: ParseConfidence::High,
            has_exact_time: true,
        });
    }
    matches.first().map(|(date, _)| EarningsInfo {
        datetime: Some(date.and_time(placeholder)),
        confidence: ParseConfidence::Medium,
        has_exact_time: false,
    })
}

/// Keyword contexts first, then blocks mentioning the company code.
/// Returns the contexts and how many of them came from keywords.
fn earnings_contexts(blocks: &[String], code: &CompanyCode) -> (Vec<String>, usize) {
    let mut contexts: Vec<String> = Vec::new();

    for (idx, block) in blocks.iter().enumerate() {
        if !has_earnings_keyword(block) {
            continue;
        }
        push_context(&mut contexts, block.clone());
        if parse_date(block).is_none() {
            if let Some(next) = blocks.get(idx + 1) {
                push_context(&mut contexts, format!("{block} {next}"));
            }
        }
    }
    let keyword_count = contexts.len();

    for block in blocks.iter().filter(|b| b.contains(code.as_str())) {
        push_context(&mut contexts, block.clone());
    }

    (contexts, keyword_count)
}

fn push_context(contexts: &mut Vec<String>, ctx: String) {
    if contexts.len() < MAX_CONTEXTS && !ctx.is_empty() && !contexts.contains(&ctx) {
        contexts.push(ctx);
    }
}

fn has_earnings_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    EARNINGS_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn has_undetermined_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    UNDETERMINED_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Folds full-width digits, colon and slash to ASCII.
fn normalize_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(u32::from(c) - u32::from('０') + u32::from('0')).unwrap_or(c),
            '：' => ':',
            '／' => '/',
            _ => c,
        })
        .collect()
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    for (re, era) in DATE_PATTERNS.iter() {
        for cap in re.captures_iter(text) {
            let year = if &cap[1] == "元" {
                Ok(1)
            } else {
                cap[1].parse::<i32>()
            };
            let (Ok(year), Ok(month), Ok(day)) =
                (year, cap[2].parse::<u32>(), cap[3].parse::<u32>())
            else {
                continue;
            };
            if let Some(date) = NaiveDate::from_ymd_opt(era.to_gregorian(year), month, day) {
                return Some(date);
            }
        }
    }
    None
}

pub(crate) fn parse_time(text: &str) -> Option<NaiveTime> {
    for (re, meridiem) in TIME_PATTERNS.iter() {
        for cap in re.captures_iter(text) {
            let Ok(mut hour) = cap[1].parse::<u32>() else {
                continue;
            };
            let minute = cap
                .get(2)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            match meridiem {
                Meridiem::Pm if hour < 12 => hour += 12,
                Meridiem::Am if hour == 12 => hour = 0,
                _ => {}
            }
            if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
                return Some(time);
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
