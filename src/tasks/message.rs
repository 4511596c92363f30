//! 队列消息与来源标识
//!
//! 生产者身份显式地放在消息里 (`source` 字段), 而不是编码进数值范围,
//! 因此负载值与身份值可以任意重叠。

use core::fmt;

/// 生产者身份 (创建任务时绑定, 之后不可变)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 已知生产者: 身份 + 报告中使用的名称
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProducerIdentity {
    pub id: SourceId,
    pub label: &'static str,
}

impl ProducerIdentity {
    pub const fn new(id: u32, label: &'static str) -> Self {
        Self {
            id: SourceId(id),
            label,
        }
    }
}

/// 队列中传递的消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message {
    /// 来源生产者
    pub source: SourceId,
    /// 来源内的序号, 从 0 开始, 每个周期加 1 (发送失败也会消耗序号)
    pub seq: u32,
    /// 负载
    pub value: u32,
}

/// 消息来源分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Provenance {
    /// 来自已知生产者
    Known(ProducerIdentity),
    /// 来源不在已知列表中
    Unknown(SourceId),
}

impl Provenance {
    /// 按 `source` 在已知生产者中查找
    pub fn classify(message: &Message, known: &[ProducerIdentity]) -> Self {
        known
            .iter()
            .find(|identity| identity.id == message.source)
            .map_or(Self::Unknown(message.source), |identity| Self::Known(*identity))
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(identity) => write!(f, "from {}", identity.label),
            Self::Unknown(id) => write!(f, "from unknown source {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN: [ProducerIdentity; 2] = [
        ProducerIdentity::new(100, "producer A"),
        ProducerIdentity::new(200, "producer B"),
    ];

    #[test]
    fn test_classify_by_source_not_value() {
        // 负载值与另一个生产者的身份重叠, 不影响分类
        let message = Message {
            source: SourceId(100),
            seq: 0,
            value: 200,
        };
        let provenance = Provenance::classify(&message, &KNOWN);
        assert_eq!(provenance, Provenance::Known(KNOWN[0]));
        assert_eq!(provenance.to_string(), "from producer A");
    }

    #[test]
    fn test_classify_unknown_source() {
        let message = Message {
            source: SourceId(300),
            seq: 0,
            value: 300,
        };
        let provenance = Provenance::classify(&message, &KNOWN);
        assert!(!provenance.is_known());
        assert_eq!(provenance.to_string(), "from unknown source 300");
    }
}
