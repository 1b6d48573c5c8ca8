//! 本地化数字规范化
//!
//! 面板截图里同一个计数可能写成 "12,345"、"۱۲٬۳۴۵" 或 "1.5K"。
//! 这里统一折算成规范整数：数字字形映射、千位分隔剥离、
//! 缩写倍率展开。规范化后仍有残留字符的读数记为不洁净，
//! 由调用方降权处理。

use once_cell::sync::Lazy;
use regex::Regex;

static CLEAN_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").unwrap());
static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)?").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub value: i64,
    /// 规范化后没有残留字符
    pub clean: bool,
    /// 按实际出现的数字字形推断："fa" / "ar"，拉丁数字为 None
    pub locale: Option<&'static str>,
}

/// 完全无法提取数字时返回 None
pub fn normalize(raw: &str) -> Option<Normalized> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut locale: Option<&'static str> = None;
    let mut mapped = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        match ch {
            // 波斯数字 ۰-۹
            '\u{06F0}'..='\u{06F9}' => {
                locale.get_or_insert("fa");
                let d = (ch as u32 - 0x06F0) as u8;
                mapped.push((b'0' + d) as char);
            }
            // 阿拉伯-印度数字 ٠-٩
            '\u{0660}'..='\u{0669}' => {
                locale.get_or_insert("ar");
                let d = (ch as u32 - 0x0660) as u8;
                mapped.push((b'0' + d) as char);
            }
            // 千位分隔与空白
            ',' | '\u{066C}' | '\u{060C}' | '\u{00A0}' | '\u{202F}' | ' ' | '\'' => {}
            // 波斯小数点
            '\u{066B}' => mapped.push('.'),
            // 百分号忽略
            '%' | '\u{066A}' => {}
            _ => mapped.push(ch),
        }
    }

    let (body, multiplier) = if let Some(b) = mapped.strip_suffix(|c| c == 'k' || c == 'K') {
        (b, 1_000f64)
    } else if let Some(b) = mapped.strip_suffix(|c| c == 'm' || c == 'M') {
        (b, 1_000_000f64)
    } else {
        (mapped.as_str(), 1f64)
    };
    let body = body.trim();

    let clean = CLEAN_NUMBER.is_match(body);
    let number: f64 = if clean {
        body.parse().ok()?
    } else {
        FIRST_NUMBER.find(body)?.as_str().parse().ok()?
    };

    Some(Normalized {
        value: (number * multiplier).round() as i64,
        clean,
        locale,
    })
}
