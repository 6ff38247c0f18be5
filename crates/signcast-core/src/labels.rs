use std::borrow::Cow;
use std::sync::Arc;

const SIGN_VOCABULARY_EN: [&str; 35] = [
    "time",
    "you/your/this",
    "morning",
    "9",
    "0",
    "happy",
    "new",
    "wish",
    "please",
    "road",
    "birthday",
    "flat",
    "safe",
    "friend",
    "8",
    "know",
    "business card",
    "marry/wife",
    "tea",
    "have",
    "flavor",
    "today",
    "door",
    "stop",
    "thank you",
    "slow",
    "walk",
    "late/night",
    "I/me",
    "love",
    "good",
    "person",
    "what",
    "name",
    "introduce",
];

const SIGN_VOCABULARY_ZH: [&str; 35] = [
    "时间/时候",
    "你/您/你的/这",
    "早上",
    "9",
    "0",
    "快乐/高兴",
    "新",
    "祝",
    "请",
    "路",
    "生日",
    "平",
    "安",
    "朋友",
    "8",
    "认识",
    "名片",
    "结婚/妻子",
    "茶",
    "有",
    "花",
    "今天",
    "门",
    "停",
    "谢谢",
    "慢",
    "走",
    "晚",
    "我",
    "爱",
    "好",
    "人",
    "什么",
    "名字",
    "介绍",
];

/// Class-id to display-name table. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelSet {
    names: Arc<[String]>,
}

impl LabelSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The 35-sign vocabulary with English names.
    pub fn sign_vocabulary() -> Self {
        Self::new(SIGN_VOCABULARY_EN)
    }

    /// The 35-sign vocabulary with Chinese names.
    pub fn sign_vocabulary_zh() -> Self {
        Self::new(SIGN_VOCABULARY_ZH)
    }

    /// Display name for a class id; unknown ids render as `class_<id>`.
    pub fn name(&self, class_id: usize) -> Cow<'_, str> {
        match self.names.get(class_id) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("class_{class_id}")),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::sign_vocabulary()
    }
}
