#![forbid(unsafe_code)]

//! Parser for the live-chat replay yt-dlp writes as `<id>.live_chat.json`.
//!
//! The file holds one JSON action per line. Text messages become live-chat
//! entries; paid messages and paid stickers become superchat entries with the
//! displayed purchase amount split into a currency code and a number.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::ChatKind;
use crate::model::ChatMessage;

/// Extracts every chat entry carried by one replay line.
pub fn parse_line(line: &str) -> Vec<(ChatKind, ChatMessage)> {
    let Ok(value) = serde_json::from_str::<Value>(line.trim()) else {
        return Vec::new();
    };

    let actions: Vec<&Value> = match value
        .pointer("/replayChatItemAction/actions")
        .and_then(Value::as_array)
    {
        Some(actions) => actions.iter().collect(),
        None => vec![&value],
    };

    actions
        .into_iter()
        .filter_map(|action| action.pointer("/addChatItemAction/item"))
        .filter_map(parse_item)
        .collect()
}

fn parse_item(item: &Value) -> Option<(ChatKind, ChatMessage)> {
    if let Some(renderer) = item.get("liveChatTextMessageRenderer") {
        let mut message = base_message(renderer);
        message.text = runs_text(renderer.get("message"));
        return Some((ChatKind::LiveChat, message));
    }

    let renderer = item
        .get("liveChatPaidMessageRenderer")
        .or_else(|| item.get("liveChatPaidStickerRenderer"))?;
    let mut message = base_message(renderer);
    message.text = runs_text(renderer.get("message"));
    if message.text.is_empty()
        && let Some(label) = renderer
            .pointer("/sticker/accessibility/accessibilityData/label")
            .and_then(Value::as_str)
    {
        message.text = label.to_owned();
    }
    if let Some((currency, amount)) = renderer
        .pointer("/purchaseAmountText/simpleText")
        .and_then(Value::as_str)
        .and_then(parse_amount)
    {
        message.money_currency = Some(currency);
        message.money_amount = Some(amount);
    }
    Some((ChatKind::SuperChat, message))
}

fn base_message(renderer: &Value) -> ChatMessage {
    ChatMessage {
        id: renderer.get("id").and_then(Value::as_str).map(str::to_owned),
        author: renderer
            .pointer("/authorName/simpleText")
            .and_then(Value::as_str)
            .map(str::to_owned),
        text: String::new(),
        money_currency: None,
        money_amount: None,
        timestamp: renderer
            .get("timestampUsec")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_micros)
            .map(|datetime| datetime.to_rfc3339()),
    }
}

/// Concatenates text runs; emoji runs contribute their first shortcut.
fn runs_text(message: Option<&Value>) -> String {
    let Some(message) = message else {
        return String::new();
    };
    if let Some(text) = message.get("simpleText").and_then(Value::as_str) {
        return text.to_owned();
    }
    let Some(runs) = message.get("runs").and_then(Value::as_array) else {
        return String::new();
    };

    let mut text = String::new();
    for run in runs {
        if let Some(part) = run.get("text").and_then(Value::as_str) {
            text.push_str(part);
        } else if let Some(emoji) = run.get("emoji") {
            let shortcut = emoji
                .pointer("/shortcuts/0")
                .or_else(|| emoji.get("emojiId"))
                .and_then(Value::as_str);
            if let Some(shortcut) = shortcut {
                text.push_str(shortcut);
            }
        }
    }
    text
}

const CURRENCY_SYMBOLS: [(&str, &str); 22] = [
    ("US$", "USD"),
    ("CA$", "CAD"),
    ("A$", "AUD"),
    ("NZ$", "NZD"),
    ("MX$", "MXN"),
    ("HK$", "HKD"),
    ("NT$", "TWD"),
    ("R$", "BRL"),
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("JP¥", "JPY"),
    ("CN¥", "CNY"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("₩", "KRW"),
    ("₱", "PHP"),
    ("₪", "ILS"),
    ("₫", "VND"),
    ("₽", "RUB"),
    ("₺", "TRY"),
    ("zł", "PLN"),
];

/// Splits a displayed amount such as `$5.00`, `R$ 10,00`, `CHF 3.50` or
/// `1.234,50 €` into an ISO currency code and a number. Unknown symbols are
/// kept verbatim as the currency.
pub fn parse_amount(display: &str) -> Option<(String, f64)> {
    let display = display.trim();
    let start = display.find(|ch: char| ch.is_ascii_digit())?;
    let end = display
        .rfind(|ch: char| ch.is_ascii_digit())
        .map(|index| index + 1)?;

    let number = &display[start..end];
    let symbol = format!("{}{}", &display[..start], &display[end..]);
    let symbol = symbol
        .trim_matches(|ch: char| ch.is_whitespace() || ch == '\u{a0}')
        .to_owned();
    if symbol.is_empty() {
        return None;
    }

    let currency = CURRENCY_SYMBOLS
        .iter()
        .find(|(candidate, _)| *candidate == symbol)
        .map(|(_, code)| (*code).to_owned())
        .unwrap_or(symbol);
    let amount = parse_number(number)?;
    Some((currency, amount))
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == ',')
        .collect();

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = cleaned.len() - comma - 1;
            if decimals <= 2 && cleaned.matches(',').count() == 1 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };
    normalized.parse().ok()
}
