use serde::{Deserialize, Serialize};

/// Storage discipline a [`LineBuffer`] is operating under (§4.1).
///
/// `Streaming` buffers are append-only and the cursor always sits at the
/// last written index. `Preloaded` buffers are filled once in bulk (by an
/// indicator's `once(start, end)` or a feed's `preload()`) and the cursor
/// is then moved independently of writes, which is what lets positive
/// `ago` reads work in vectorized mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Discipline {
    Streaming,
    Preloaded,
}

/// A contiguous, time-relative-indexed sequence of `f64`.
///
/// `NaN` is a legal "no value" sentinel (warm-up placeholders, out-of-range
/// reads). The cursor is monotonically non-decreasing within a run phase
/// and the buffer never reorders values (§3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineBuffer {
    values: Vec<f64>,
    /// Absolute index the cursor currently points at. `-1` before the
    /// first bar has been appended (feed not yet started).
    cursor: isize,
    discipline: Discipline,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            cursor: -1,
            discipline: Discipline::Streaming,
        }
    }

    /// Creates a buffer pre-allocated for `capacity` vectorized writes, with
    /// the cursor left at `-1` until [`home`](Self::home) is called — the
    /// convention a feed's `preload()` or an indicator's `once()` follows
    /// before the vectorized bar loop begins walking it.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            cursor: -1,
            discipline: Discipline::Preloaded,
        }
    }

    /// Appends a value and advances the cursor by one. Legal in both
    /// disciplines; a `Preloaded` buffer may still be appended to while
    /// it is being bulk-filled, before `home()` is called.
    pub fn append(&mut self, value: f64) {
        self.values.push(value);
        self.cursor = self.values.len() as isize - 1;
    }

    /// Overwrites the value at offset `ago` relative to the cursor.
    /// `set(0, v)` overwrites the value at the cursor (equivalent to
    /// redoing the last `append`).
    pub fn set(&mut self, ago: isize, value: f64) {
        if let Some(idx) = self.absolute_index(ago) {
            self.values[idx] = value;
        }
    }

    /// Reads the value at offset `ago` relative to the cursor. Returns
    /// `NaN` for any `ago` outside the legal range for the current
    /// discipline and cursor position (§4.1).
    pub fn get(&self, ago: isize) -> f64 {
        match self.absolute_index(ago) {
            Some(idx) => self.values[idx],
            None => f64::NAN,
        }
    }

    /// Number of values written so far.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Total reserved length, which may exceed `size()` for a
    /// vectorized buffer mid-fill.
    pub fn buflen(&self) -> usize {
        self.values.capacity().max(self.values.len())
    }

    /// Resets the cursor to the first written value (index 0).
    pub fn home(&mut self) {
        self.cursor = 0;
    }

    /// Advances the cursor by `n` without writing (used by the vectorized
    /// bar loop once `once()` has pre-filled every indicator's output).
    pub fn forward(&mut self, n: isize) {
        self.cursor += n;
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Absolute positional read, bypassing the cursor entirely.
    ///
    /// A true vectorized `once(start, end)` processes a known index
    /// range in one pass without a shared per-bar clock stepping every
    /// buffer's cursor in lockstep, so it addresses by position rather
    /// than by `ago`. Out-of-range reads return `NaN`, same convention
    /// as [`Self::get`].
    pub fn at(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(f64::NAN)
    }

    /// Absolute positional write, the `once()` counterpart to
    /// [`Self::at`].
    pub fn set_at(&mut self, index: usize, value: f64) {
        if index < self.values.len() {
            self.values[index] = value;
        }
    }

    /// Absolute index in `values` for time-relative offset `ago`, or
    /// `None` if that read is out of range for the current discipline.
    fn absolute_index(&self, ago: isize) -> Option<usize> {
        let idx = self.cursor + ago;
        if idx < 0 {
            return None;
        }
        let idx = idx as usize;

        match self.discipline {
            // Streaming: only ago in [-(size-1), 0] is legal — no reading
            // past the cursor, since future bars haven't arrived yet.
            Discipline::Streaming => {
                if ago > 0 || idx >= self.values.len() {
                    None
                } else {
                    Some(idx)
                }
            }
            // Preloaded: positive ago up to (buflen - 1 - cursor) is legal,
            // since the whole array is already populated.
            Discipline::Preloaded => {
                if idx >= self.values.len() {
                    None
                } else {
                    Some(idx)
                }
            }
        }
    }
}
