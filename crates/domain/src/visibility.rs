//! 消息可见性规则
//!
//! 广播与状态消息对所有人可见；私聊消息只对发送者和接收者可见。

use crate::message::{Message, MessageType};

/// 判断 `viewer` 能否看到 `message`。
///
/// `viewer` 为 `None` 表示匿名读取者，只能看到公开消息。查看者不要求是在线参与者。
pub fn is_visible(message: &Message, viewer: Option<&str>) -> bool {
    match message.message_type {
        MessageType::Broadcast | MessageType::Status => true,
        MessageType::Private => match viewer {
            Some(viewer) => message.from.as_str() == viewer || message.to.is_participant(viewer),
            None => false,
        },
    }
}
