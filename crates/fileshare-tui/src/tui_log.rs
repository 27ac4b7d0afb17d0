//! TUI 日志层
//!
//! 把 tracing 事件（包括经 `LogTracer` 桥接的 `log` 记录）转成 [`LogEntry`]
//! 发送到日志面板。

use crate::app::AppEvent;
use fileshare_core::{LogEntry, LogLevel};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

pub struct TuiLogLayer {
    tx: mpsc::Sender<AppEvent>,
}

impl TuiLogLayer {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for TuiLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));

        // log 桥接过来的事件 target 为 "log"，真实来源在 log.target 字段里
        let target = event.metadata().target();
        if message.is_empty() {
            message = target.to_string();
        } else if !target.starts_with("fileshare") && target != "log" {
            message = format!("{target}: {message}");
        }

        let entry = LogEntry::new(level_of(event.metadata().level()), message);

        // 面板跟不上时丢弃
        let _ = self.tx.try_send(AppEvent::Log(entry));
    }
}

fn level_of(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        Level::DEBUG => LogLevel::Debug,
        Level::TRACE => LogLevel::Trace,
    }
}

/// 取出 `message` 字段，忽略 `log.*` 元数据字段
struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{:?}", value);
        } else if self.0.is_empty() && !field.name().starts_with("log.") {
            *self.0 = format!("{}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.0 = value.to_string();
        } else if self.0.is_empty() && !field.name().starts_with("log.") {
            *self.0 = format!("{}={}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_events_reach_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(TuiLogLayer::new(tx));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("disk almost full");
        });

        match rx.try_recv() {
            Ok(AppEvent::Log(entry)) => {
                assert_eq!(entry.level, LogLevel::Warn);
                assert!(entry.message.ends_with("disk almost full"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
