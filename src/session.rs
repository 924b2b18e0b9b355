//! Per-entry private metadata and open read/write sessions.
//!
//! Every entry owns one [`EntryContext`]; the backing store keeps an `Arc`
//! to it and hands clones to sessions, so the metadata outlives the entry's
//! logical removal for as long as any session is in flight. The validity
//! flag is what stops such a session from reading: it flips to false the
//! moment the entry begins destruction.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::warn;

use crate::engine::Engine;
use crate::error::{InspectError, InspectResult};
use crate::stat::StatState;
use crate::traits::{SeqSource, WriteHandler};
use crate::types::{EntryMode, NodeId};

/// Private session metadata of one entry.
pub struct EntryContext {
    valid: AtomicBool,
    mode: EntryMode,
    reader: Option<Arc<dyn SeqSource>>,
    writer: Option<Arc<dyn WriteHandler>>,
    stat: Option<Arc<StatState>>,
    stat_id: Option<NodeId>,
    engine: Weak<Engine>,
}

impl EntryContext {
    pub(crate) fn new(
        engine: Weak<Engine>,
        mode: EntryMode,
        reader: Option<Arc<dyn SeqSource>>,
        writer: Option<Arc<dyn WriteHandler>>,
        stat: Option<(Arc<StatState>, NodeId)>,
    ) -> Self {
        let (stat, stat_id) = match stat {
            Some((state, id)) => (Some(state), Some(id)),
            None => (None, None),
        };
        EntryContext {
            valid: AtomicBool::new(true),
            mode,
            reader,
            writer,
            stat,
            stat_id,
            engine,
        }
    }

    /// Access mode the entry was created with.
    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Marks the entry as destroyed. Sessions opened but not yet reading
    /// are rejected from here on.
    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    /// Opens a read/write session on the entry.
    ///
    /// This is what a [`BackingStore`](crate::traits::BackingStore) calls
    /// when something opens the physical node. Fails with an I/O error if
    /// the entry has already begun destruction.
    pub fn open(self: &Arc<Self>) -> InspectResult<EntrySession> {
        if !self.is_valid() {
            warn!("open rejected: entry removed");
            if let Some(engine) = self.engine.upgrade() {
                engine.metrics().record_rejected_open();
            }
            return Err(InspectError::Io {
                reason: "entry removed".to_string(),
            });
        }
        Ok(EntrySession {
            ctx: Arc::clone(self),
            position: 0,
            holding: false,
        })
    }
}

impl fmt::Debug for EntryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryContext")
            .field("valid", &self.is_valid())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// One open read/write handle on an entry.
///
/// A session is single-threaded; one entry may have any number of concurrent
/// sessions. For statistic entries, `start` takes a transient reference on
/// the statistic for the duration of the iteration — the sole mechanism that
/// keeps a concurrent remove from freeing state still being read.
pub struct EntrySession {
    ctx: Arc<EntryContext>,
    position: u64,
    holding: bool,
}

impl EntrySession {
    /// Begins an iteration at position 0. Returns true if a record was
    /// produced; false means the sequence is empty or the entry is being
    /// destroyed.
    pub fn start(&mut self) -> bool {
        self.position = 0;
        if let Some(stat) = &self.ctx.stat {
            if !self.holding {
                let engine = match self.ctx.engine.upgrade() {
                    Some(engine) => engine,
                    None => return false,
                };
                let stat_id = match self.ctx.stat_id {
                    Some(id) => id,
                    None => return false,
                };
                // Lost the race against removal (or the arena slot has been
                // recycled since): yield no results.
                if !engine.acquire_stat(stat_id, stat) {
                    return false;
                }
                self.holding = true;
            }
            return stat.fetch(self.position);
        }
        if !self.ctx.is_valid() {
            return false;
        }
        match &self.ctx.reader {
            Some(reader) => reader.start(self.position),
            None => false,
        }
    }

    /// Advances the iteration. Same termination contract as [`start`].
    ///
    /// [`start`]: EntrySession::start
    pub fn next(&mut self) -> bool {
        self.position += 1;
        if let Some(stat) = &self.ctx.stat {
            // Reading past a failed start would touch a statistic this
            // session holds no reference on.
            if !self.holding {
                return false;
            }
            return stat.fetch(self.position);
        }
        if !self.ctx.is_valid() {
            return false;
        }
        match &self.ctx.reader {
            Some(reader) => reader.next(self.position),
            None => false,
        }
    }

    /// Ends the iteration, dropping the hold taken in `start` if one was
    /// taken by this session. That release may cascade the full teardown of
    /// an entry whose removal was deferred while this reader was in flight.
    pub fn stop(&mut self) {
        if self.holding {
            self.holding = false;
            if let (Some(engine), Some(stat_id)) =
                (self.ctx.engine.upgrade(), self.ctx.stat_id)
            {
                engine.release(stat_id);
            }
            return;
        }
        if self.ctx.stat.is_none() {
            if let Some(reader) = &self.ctx.reader {
                reader.stop();
            }
        }
    }

    /// Renders the current record into `out`.
    ///
    /// For statistic entries this renders the cached value through the
    /// cached format; fails with an invalid-argument error if no value has
    /// been produced by a prior `start`/`next`.
    pub fn show(&self, out: &mut String) -> InspectResult<()> {
        if let Some(stat) = &self.ctx.stat {
            return match stat.render_cached() {
                Some(text) => {
                    out.push_str(&text);
                    Ok(())
                }
                None => Err(InspectError::InvalidArgument {
                    reason: "no statistic value cached".to_string(),
                }),
            };
        }
        match &self.ctx.reader {
            Some(reader) => reader.show(self.position, out),
            None => Err(InspectError::Io {
                reason: "entry is not readable".to_string(),
            }),
        }
    }

    /// Drives a full start/show/next/stop iteration and collects the output.
    pub fn read_to_string(&mut self) -> InspectResult<String> {
        let mut out = String::new();
        let mut more = self.start();
        while more {
            if let Err(err) = self.show(&mut out) {
                self.stop();
                return Err(err);
            }
            more = self.next();
        }
        self.stop();
        Ok(out)
    }

    /// Forwards a write to the entry's write handler.
    ///
    /// Fails with an I/O error if no handler was registered at creation.
    pub fn write(&self, data: Bytes, offset: u64) -> InspectResult<usize> {
        match &self.ctx.writer {
            Some(writer) => writer.write(data, offset),
            None => Err(InspectError::Io {
                reason: "entry is not writable".to_string(),
            }),
        }
    }
}

impl Drop for EntrySession {
    fn drop(&mut self) {
        // A session dropped mid-iteration must not leak its hold.
        if self.holding {
            self.stop();
        }
    }
}

impl fmt::Debug for EntrySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySession")
            .field("position", &self.position)
            .field("holding", &self.holding)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InspectError;
    use std::sync::Mutex;

    struct Lines(Vec<&'static str>);

    impl SeqSource for Lines {
        fn start(&self, position: u64) -> bool {
            (position as usize) < self.0.len()
        }

        fn next(&self, position: u64) -> bool {
            (position as usize) < self.0.len()
        }

        fn show(&self, position: u64, out: &mut String) -> InspectResult<()> {
            out.push_str(self.0[position as usize]);
            out.push('\n');
            Ok(())
        }
    }

    struct Sink(Mutex<Vec<(Bytes, u64)>>);

    impl WriteHandler for Sink {
        fn write(&self, data: Bytes, offset: u64) -> InspectResult<usize> {
            let len = data.len();
            self.0.lock().unwrap().push((data, offset));
            Ok(len)
        }
    }

    fn plain_ctx(
        reader: Option<Arc<dyn SeqSource>>,
        writer: Option<Arc<dyn WriteHandler>>,
    ) -> Arc<EntryContext> {
        let mode = EntryMode::new(reader.is_some(), writer.is_some());
        Arc::new(EntryContext::new(Weak::new(), mode, reader, writer, None))
    }

    #[test]
    fn test_plain_read_iteration() {
        let ctx = plain_ctx(Some(Arc::new(Lines(vec!["one", "two"]))), None);
        let mut session = ctx.open().unwrap();
        assert_eq!(session.read_to_string().unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_open_rejected_after_invalidate() {
        let ctx = plain_ctx(Some(Arc::new(Lines(vec!["one"]))), None);
        ctx.invalidate();
        match ctx.open() {
            Err(InspectError::Io { .. }) => {}
            other => panic!("expected I/O rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_invalidate_stops_in_flight_session() {
        let ctx = plain_ctx(Some(Arc::new(Lines(vec!["one", "two"]))), None);
        let mut session = ctx.open().unwrap();
        assert!(session.start());
        ctx.invalidate();
        assert!(!session.next());
    }

    #[test]
    fn test_write_without_handler_rejected() {
        let ctx = plain_ctx(Some(Arc::new(Lines(vec![]))), None);
        let session = ctx.open().unwrap();
        match session.write(Bytes::from_static(b"x"), 0) {
            Err(InspectError::Io { .. }) => {}
            other => panic!("expected I/O rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_write_forwards_bytes_and_offset() {
        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        let ctx = plain_ctx(None, Some(sink.clone()));
        let session = ctx.open().unwrap();

        let written = session.write(Bytes::from_static(b"hello"), 7).unwrap();
        assert_eq!(written, 5);

        let calls = sink.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0].0[..], b"hello");
        assert_eq!(calls[0].1, 7);
    }

    #[test]
    fn test_read_on_write_only_entry_yields_nothing() {
        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        let ctx = plain_ctx(None, Some(sink));
        let mut session = ctx.open().unwrap();
        assert!(!session.start());
        assert_eq!(session.read_to_string().unwrap(), "");
    }
}
