use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// 面板上跟踪的互动指标字段
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Views,
    Followers,
    NonFollowers,
    AccountsReached,
    Interactions,
    Likes,
    Replies,
    Shares,
    LinksClicks,
    StickerTaps,
    Navigation,
    Forward,
    NextStory,
    Back,
    Exited,
    ProfileActivity,
    ProfileVisits,
    ExternalLinkTaps,
    Follows,
}

impl MetricField {
    /// 全量字段列表，提取请求默认覆盖所有字段
    pub const ALL: [MetricField; 19] = [
        MetricField::Views,
        MetricField::Followers,
        MetricField::NonFollowers,
        MetricField::AccountsReached,
        MetricField::Interactions,
        MetricField::Likes,
        MetricField::Replies,
        MetricField::Shares,
        MetricField::LinksClicks,
        MetricField::StickerTaps,
        MetricField::Navigation,
        MetricField::Forward,
        MetricField::NextStory,
        MetricField::Back,
        MetricField::Exited,
        MetricField::ProfileActivity,
        MetricField::ProfileVisits,
        MetricField::ExternalLinkTaps,
        MetricField::Follows,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricField::Views => "views",
            MetricField::Followers => "followers",
            MetricField::NonFollowers => "non_followers",
            MetricField::AccountsReached => "accounts_reached",
            MetricField::Interactions => "interactions",
            MetricField::Likes => "likes",
            MetricField::Replies => "replies",
            MetricField::Shares => "shares",
            MetricField::LinksClicks => "links_clicks",
            MetricField::StickerTaps => "sticker_taps",
            MetricField::Navigation => "navigation",
            MetricField::Forward => "forward",
            MetricField::NextStory => "next_story",
            MetricField::Back => "back",
            MetricField::Exited => "exited",
            MetricField::ProfileActivity => "profile_activity",
            MetricField::ProfileVisits => "profile_visits",
            MetricField::ExternalLinkTaps => "external_link_taps",
            MetricField::Follows => "follows",
        }
    }

    pub fn from_name(name: &str) -> Option<MetricField> {
        MetricField::ALL.iter().copied().find(|f| f.name() == name)
    }
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 单帧单字段的一次读数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricReading {
    pub frame_index: u32,
    pub field: MetricField,
    /// 识别服务返回的原始文本（可能含本地化数字/分隔符/缩写）
    pub raw: String,
    /// 规范化后的整数值
    pub value: i64,
    /// [0,1]，原始文本未通过格式校验时会被降权
    pub confidence: f32,
    /// 按实际出现的数字字形推断的区域标签
    pub locale: Option<String>,
}

/// 识别服务随指标一起报告的帧级元信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelMeta {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub date_range: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// 某帧的提取在重试耗尽后仍未拿到可用响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameReadingFailure {
    pub frame_index: u32,
    /// 该帧本应覆盖、但因失败而缺读数的字段
    pub fields: Vec<MetricField>,
    pub reason: String,
}

/// 单个字段的胜出值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: i64,
    /// 胜出分组内单条读数的最高置信度
    pub confidence: f32,
    /// 贡献该值的帧序号（升序）
    pub frames: Vec<u32>,
}

/// 跨帧合并后的最终指标
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub values: BTreeMap<MetricField, FieldValue>,
    /// 所有帧都没有读数的字段，绝不默认成 0
    pub unavailable: BTreeSet<MetricField>,
}

impl AggregatedMetrics {
    pub fn available_fields(&self) -> Vec<MetricField> {
        self.values.keys().copied().collect()
    }

    pub fn missing_fields(&self) -> Vec<MetricField> {
        self.unavailable.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
