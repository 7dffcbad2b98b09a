//! Logcat text import
//!
//! Understands `logcat -v threadtime` output:
//!
//! ```text
//! 01-02 03:04:05.678901  1000  2000 D Tag: message
//! ```
//!
//! and the bugreport flavour, which adds a uid column (numeric or a user
//! name) and pads tags with spaces before the colon.

use crate::context::TraceContext;
use crate::storage::Stat;
use tracery_shared::types::events::{AndroidLogEvent, AndroidLogPriority};
use tracery_shared::types::profile::AndroidLogRow;
use tracery_shared::utils::time::{mk_time, NANOS_PER_SEC};
use tracing::{debug, info};

/// Parses logcat lines, which carry no year, as if logged in `year`.
#[derive(Debug, Clone, Copy)]
pub struct AndroidLogParser {
    year: i32,
}

impl AndroidLogParser {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    /// Parse every line of `text` into the android log table.
    ///
    /// Returns the number of events added.
    pub fn parse_text(&self, ctx: &mut TraceContext, text: &str) -> usize {
        let mut parsed = 0;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            ctx.storage.increment_stat(Stat::AndroidLogNumTotal);
            if line.starts_with("--------- beginning of") {
                ctx.storage.increment_stat(Stat::AndroidLogNumSkipped);
                continue;
            }
            match self.parse_line(line) {
                Some(event) => {
                    insert_event(ctx, &event);
                    parsed += 1;
                }
                None => {
                    debug!("Could not parse logcat line: {}", line);
                    ctx.storage.increment_stat(Stat::AndroidLogNumFailed);
                }
            }
        }
        // Bugreport sections are each sorted, but not with each other.
        ctx.storage.android_logs.sort_by_key(|row| row.ts);
        info!("Parsed {} logcat events", parsed);
        parsed
    }

    pub fn parse_line(&self, line: &str) -> Option<AndroidLogEvent> {
        let mut rest = line;
        let date = next_token(&mut rest)?;
        let time = next_token(&mut rest)?;

        let (month, day) = date.split_once('-')?;
        let (hms, fraction) = time.split_once('.')?;
        let mut hms = hms.splitn(3, ':');
        let (hour, min, sec) = (hms.next()?, hms.next()?, hms.next()?);
        let secs = mk_time(
            self.year,
            month.parse().ok()?,
            day.parse().ok()?,
            hour.parse().ok()?,
            min.parse().ok()?,
            sec.parse().ok()?,
        )?;
        let nanos = parse_fraction(fraction)?;

        // [uid] pid tid priority
        let mut columns = Vec::with_capacity(3);
        let prio = loop {
            let token = next_token(&mut rest)?;
            if columns.len() >= 2 {
                if let Some(prio) = priority(token) {
                    break prio;
                }
            }
            if columns.len() == 3 {
                return None;
            }
            columns.push(token);
        };
        let (pid, tid) = match columns.as_slice() {
            [pid, tid] | [_, pid, tid] => (pid.parse().ok()?, tid.parse().ok()?),
            _ => return None,
        };

        let (tag, message) = split_tag(rest)?;
        Some(AndroidLogEvent {
            timestamp: secs.checked_mul(NANOS_PER_SEC)?.checked_add(nanos)?,
            pid,
            tid,
            prio,
            tag: tag.to_string(),
            message: message.to_string(),
        })
    }
}

/// Store one event, creating its thread and process on first sight.
pub fn insert_event(ctx: &mut TraceContext, event: &AndroidLogEvent) {
    let utid = ctx
        .process_tracker
        .update_thread(&mut ctx.storage, event.tid, Some(event.pid));
    let row = AndroidLogRow {
        ts: event.timestamp,
        utid,
        prio: event.prio,
        tag: ctx.storage.intern_string(&event.tag),
        msg: ctx.storage.intern_string(&event.message),
    };
    ctx.storage.android_logs.push(row);
}

fn next_token<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = rest.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (token, tail) = s.split_at(end);
    *rest = tail;
    Some(token)
}

fn priority(token: &str) -> Option<AndroidLogPriority> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => AndroidLogPriority::from_letter(c),
        _ => None,
    }
}

/// Fractional seconds of 1 to 9 digits, as nanoseconds.
fn parse_fraction(fraction: &str) -> Option<i64> {
    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = fraction.parse().ok()?;
    Some(value * 10_i64.pow(9 - fraction.len() as u32))
}

/// Split `tag: message`. Tags may themselves contain colons.
fn split_tag(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim();
    if let Some(idx) = rest.find(": ") {
        return Some((rest[..idx].trim(), rest[idx + 2..].trim()));
    }
    rest.strip_suffix(':').map(|tag| (tag.trim(), ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;

    fn ctx() -> TraceContext {
        TraceContext::new(ProcessorConfig::default())
    }

    fn events(ctx: &TraceContext) -> Vec<(i64, i32, AndroidLogPriority, &str, &str)> {
        let storage = &ctx.storage;
        storage
            .android_logs
            .iter()
            .map(|row| {
                let thread = &storage.threads[row.utid];
                (
                    row.ts,
                    thread.tid,
                    row.prio,
                    storage.get_string(row.tag),
                    storage.get_string(row.msg),
                )
            })
            .collect()
    }

    #[test]
    fn test_threadtime_line() {
        let mut ctx = ctx();
        let parser = AndroidLogParser::new(2020);
        let parsed = parser.parse_text(&mut ctx, "01-02 03:04:05.678901 1000 2000 D Tag: message\n");

        assert_eq!(parsed, 1);
        assert_eq!(
            events(&ctx),
            vec![(
                1_577_934_245_678_901_000,
                2000,
                AndroidLogPriority::Debug,
                "Tag",
                "message"
            )]
        );
        let thread = &ctx.storage.threads[ctx.storage.android_logs[0].utid];
        let process = &ctx.storage.processes[thread.upid.unwrap()];
        assert_eq!(process.pid, 1000);
        assert_eq!(ctx.storage.stats.get(Stat::AndroidLogNumFailed), 0);
        assert_eq!(ctx.storage.stats.get(Stat::AndroidLogNumTotal), 1);
    }

    #[test]
    fn test_bugreport_lines() {
        let mut ctx = ctx();
        let parser = AndroidLogParser::new(2020);
        let text = "\
07-28 14:25:20.355  0     1     2 I init   : Loaded kernel module /lib/modules/zram.ko
07-28 14:25:54.876  1000   643   644 D PackageManager: No files in app dir /vendor/app
07-28 14:25:20.355 root     0     1 I        : c0  11835 binder: 1
";
        assert_eq!(parser.parse_text(&mut ctx, text), 3);

        let parsed = events(&ctx);
        assert!(parsed.contains(&(
            1_595_946_320_355_000_000,
            2,
            AndroidLogPriority::Info,
            "init",
            "Loaded kernel module /lib/modules/zram.ko"
        )));
        assert!(parsed.contains(&(
            1_595_946_354_876_000_000,
            644,
            AndroidLogPriority::Debug,
            "PackageManager",
            "No files in app dir /vendor/app"
        )));
        assert!(parsed.contains(&(
            1_595_946_320_355_000_000,
            1,
            AndroidLogPriority::Info,
            "",
            "c0  11835 binder: 1"
        )));
        // Sorted by timestamp.
        assert_eq!(parsed[2].1, 644);
    }

    #[test]
    fn test_tags_with_colons_and_short_fractions() {
        let parser = AndroidLogParser::new(1970);
        let event = parser.parse_line("01-01 00:00:01.5 1 2 W foo:bar: msg").unwrap();
        assert_eq!(event.timestamp, 1_500_000_000);
        assert_eq!(event.tag, "foo:bar");
        assert_eq!(event.message, "msg");

        let event = parser.parse_line("01-01 00:00:00.000000001 1 2 E Tag:").unwrap();
        assert_eq!(event.timestamp, 1);
        assert_eq!(event.tag, "Tag");
        assert_eq!(event.message, "");
    }

    #[test]
    fn test_failures_and_skipped_lines() {
        let mut ctx = ctx();
        let parser = AndroidLogParser::new(2020);
        let text = "\
--------- beginning of main
not a log line
01-02 03:04:05.1234567890 1 2 D Tag: fraction too long
02-30 03:04:05.1 1 2 D Tag: no such day

01-02 03:04:05.1 1 2 X Tag: bad priority
";
        assert_eq!(parser.parse_text(&mut ctx, text), 0);
        let stats = &ctx.storage.stats;
        assert_eq!(stats.get(Stat::AndroidLogNumTotal), 5);
        assert_eq!(stats.get(Stat::AndroidLogNumSkipped), 1);
        assert_eq!(stats.get(Stat::AndroidLogNumFailed), 4);
    }

    #[test]
    fn test_timestamp_past_nanosecond_range_fails() {
        let line = "01-02 03:04:05.678901 1000 2000 D Tag: message";
        let parser = AndroidLogParser::new(3000);
        assert!(parser.parse_line(line).is_none());

        let mut ctx = ctx();
        assert_eq!(parser.parse_text(&mut ctx, line), 0);
        assert_eq!(ctx.storage.stats.get(Stat::AndroidLogNumFailed), 1);
        assert!(ctx.storage.android_logs.is_empty());
    }
}
