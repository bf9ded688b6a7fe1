// haOS
// Copyright (c) 2024 The Project haOS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `ripper` module implements the bit-ripper: a bit-granular reader over
//! a circular FIFO of 32-bit words.
//!
//! Each FIFO word is treated as an MSB-first bit stream: the top bit of the
//! most recently loaded word is the next bit out. Consumers may extract or
//! peek 1..32 bit fields, skip forward and backward, checkpoint the cursor
//! (main/aux states), and realign to byte, word, or dword boundaries relative
//! to a saved reference.
//!
//! When a read finds the FIFO drained, the ripper calls back into a
//! [`StreamFeeder`] until the producer has made at least one more word
//! available. Feeders must guarantee forward progress by padding the FIFO
//! once the real input is exhausted.

use bitflags::bitflags;

use crate::config::WORD_BITS;
use crate::fifo::{ring_add, ring_sub, Fifo};

bitflags! {
    /// Control flags of one bit-ripper state block.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RipperFlags: u32 {
        /// The true read position is parked in the main-state backup while a
        /// parser roams with the current cursor.
        const IN_AUX_STATE = 1 << 0;
        /// Write and read positions coincide because the FIFO is full, not
        /// empty.
        const FIFO_FULL = 1 << 1;
    }
}

/// The producer side of the FIFO refill contract.
///
/// [`BitRipper`] calls [`fill`](StreamFeeder::fill) whenever a consumer needs
/// more bits than the FIFO holds. An implementation writes words at the
/// ripper's write position and commits them with
/// [`BitRipper::advance_write_ptr`]. Once the underlying input hits EOF the
/// feeder must keep padding so that every wait loop terminates.
pub trait StreamFeeder {
    fn fill(&mut self, ripper: &mut BitRipper, fifo: &mut Fifo);
}

/// One parked or active read position into a FIFO.
///
/// `current_word` is left-aligned: bits already consumed are shifted out at
/// the top, and only the top `bits_remaining` bits are meaningful. When
/// `bits_remaining` is zero, `current_word` is zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RipperCursor {
    pub current_word: u32,
    pub bits_remaining: u32,
    pub read_pos: usize,
    pub size: usize,
}

/// Bit-ripper state bound to one FIFO of the owning core.
///
/// The struct holds the roaming cursor, the main-state backup used while in
/// aux mode, the producer write position, and the control flags. It does not
/// own the FIFO storage; every data operation borrows the [`Fifo`] it was
/// bound to.
pub struct BitRipper {
    cur: RipperCursor,
    main_backup: RipperCursor,
    flags: RipperFlags,
    alignment_info: u32,
    overflow_cnt: u32,
    write_pos: usize,
    fifo_id: u32,
}

impl BitRipper {
    /// Create a ripper bound to `fifo` with all cursors at the buffer origin.
    pub fn new(fifo: &Fifo) -> BitRipper {
        let cursor = RipperCursor {
            current_word: 0,
            bits_remaining: 0,
            read_pos: 0,
            size: fifo.len(),
        };

        BitRipper {
            cur: cursor,
            main_backup: cursor,
            flags: RipperFlags::empty(),
            alignment_info: 0,
            overflow_cnt: 0,
            write_pos: 0,
            fifo_id: fifo.id(),
        }
    }

    /// Identity of the FIFO this ripper was bound to.
    pub fn fifo_id(&self) -> u32 {
        self.fifo_id
    }

    /// The roaming read cursor.
    pub fn cursor(&self) -> &RipperCursor {
        &self.cur
    }

    /// The producer write position, in words.
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn flags(&self) -> RipperFlags {
        self.flags
    }

    /// Count of producer write-ups that landed on the effective read
    /// position. Reserved for diagnosing producer overruns.
    pub fn overflow_count(&self) -> u32 {
        self.overflow_cnt
    }

    /// True while the main read position is parked in the backup slot.
    pub fn in_aux_state(&self) -> bool {
        self.flags.contains(RipperFlags::IN_AUX_STATE)
    }

    /// The cursor holding the true data position: the backup while in aux
    /// state, the roaming cursor otherwise.
    fn effective(&self) -> &RipperCursor {
        if self.flags.contains(RipperFlags::IN_AUX_STATE) {
            &self.main_backup
        }
        else {
            &self.cur
        }
    }

    /// Extract the next `bits` bits (1..=32), MSB-first, advancing the
    /// cursor. Waits on the feeder when the FIFO is drained mid-field.
    ///
    /// Bits delivered earlier land in the more-significant positions of the
    /// returned value's low `bits` bits.
    pub fn extract_bits(
        &mut self,
        bits: u32,
        fifo: &mut Fifo,
        feeder: &mut dyn StreamFeeder,
    ) -> u32 {
        assert!(bits >= 1 && bits <= WORD_BITS, "invalid extract bit count");

        let mut result = self.cur.current_word >> (WORD_BITS - bits);
        let remainder = bits as i32 - self.cur.bits_remaining as i32;
        let mut consumed = bits;

        if remainder > 0 {
            // The current word is exhausted; wait for the producer if the
            // FIFO is drained, then load the next word.
            while self.cur.read_pos == self.write_pos
                && !self.flags.contains(RipperFlags::FIFO_FULL)
            {
                feeder.fill(self, fifo);
            }

            self.cur.current_word = fifo[self.cur.read_pos];
            self.cur.read_pos = ring_add(self.cur.read_pos, 1, self.cur.size);
            self.flags.remove(RipperFlags::FIFO_FULL);

            consumed = remainder as u32;
            result |= self.cur.current_word >> (WORD_BITS - consumed);
            self.cur.bits_remaining = WORD_BITS;
        }

        self.cur.current_word =
            if consumed < WORD_BITS { self.cur.current_word << consumed } else { 0 };
        self.cur.bits_remaining -= consumed;

        if self.cur.bits_remaining == 0 {
            self.cur.current_word = 0;
        }

        result
    }

    /// Return the same value [`extract_bits`](Self::extract_bits) would,
    /// without advancing the cursor.
    ///
    /// The feeder may still run (and advance the write side) when the peek
    /// spans into a word the FIFO does not hold yet.
    pub fn peek(&mut self, bits: u32, fifo: &mut Fifo, feeder: &mut dyn StreamFeeder) -> u32 {
        assert!(bits >= 1 && bits <= WORD_BITS, "invalid peek bit count");

        let mut result = self.cur.current_word >> (WORD_BITS - bits);
        let remainder = bits as i32 - self.cur.bits_remaining as i32;

        if remainder > 0 {
            while self.cur.read_pos == self.write_pos
                && !self.flags.contains(RipperFlags::FIFO_FULL)
            {
                feeder.fill(self, fifo);
            }

            let next = fifo[self.cur.read_pos];
            result |= next >> (WORD_BITS - remainder as u32);
        }

        result
    }

    /// Move the cursor by `count` bits; negative counts rewind.
    ///
    /// A forward skip waits on the feeder until the FIFO holds enough bits.
    /// The refill runs against the roaming cursor, so the aux flag is parked
    /// for the duration of the wait and restored afterwards. A backward skip
    /// that lands exactly on the write position at a word boundary re-arms
    /// the full flag.
    pub fn skip_bits(&mut self, count: i32, fifo: &mut Fifo, feeder: &mut dyn StreamFeeder) {
        assert!(
            count <= self.cur.size as i32 * WORD_BITS as i32,
            "invalid skip bit count"
        );

        if count == 0 {
            return;
        }

        let mut read_pos = self.cur.read_pos;
        let mut bits_remaining = self.cur.bits_remaining as i32;

        if count > 0 {
            let aux = self.flags & RipperFlags::IN_AUX_STATE;
            self.flags.remove(RipperFlags::IN_AUX_STATE);

            while count as u32 > self.read_dipstick() {
                feeder.fill(self, fifo);
            }

            self.flags |= aux;

            let bits_to_skip = count as u32 & (WORD_BITS - 1);
            let words_to_skip = (count as u32 >> 5) as usize;

            read_pos += words_to_skip;
            bits_remaining -= bits_to_skip as i32;

            if bits_remaining < 0 {
                bits_remaining += WORD_BITS as i32;
                read_pos += 1;
            }

            if read_pos >= self.cur.size {
                read_pos -= self.cur.size;
            }
        }
        else {
            let count = (-count) as u32;

            let bits_to_skip = count & (WORD_BITS - 1);
            let words_to_skip = (count >> 5) as usize;

            let mut pos = read_pos as i64 - words_to_skip as i64;
            bits_remaining += bits_to_skip as i32;

            if bits_remaining > WORD_BITS as i32 {
                bits_remaining -= WORD_BITS as i32;
                pos -= 1;
            }

            if pos < 0 {
                pos += self.cur.size as i64;
            }
            read_pos = pos as usize;

            // Rewinding onto the producer at a word boundary means the FIFO
            // is brimming again.
            if bits_remaining & 0x1f == 0 {
                let landing = ring_sub(read_pos, (bits_remaining >> 5) as usize, self.cur.size);
                if landing == self.write_pos {
                    self.flags.insert(RipperFlags::FIFO_FULL);
                }
            }
        }

        // Reload the partially consumed word the new position falls in.
        let mut current_word = 0;

        if bits_remaining != 0 {
            let word_pos = ring_sub(read_pos, 1, self.cur.size);
            current_word = fifo[word_pos] << (WORD_BITS - bits_remaining as u32);
        }

        self.cur.current_word = current_word;
        self.cur.bits_remaining = bits_remaining as u32;
        self.cur.read_pos = read_pos;
    }

    /// Count of bits currently available to the consumer.
    ///
    /// While in aux state the count is taken against the parked main cursor,
    /// so the roaming parser does not affect the producer-visible fill level.
    pub fn read_dipstick(&self) -> u32 {
        let state = self.effective();

        let mut words_in_fifo = self.write_pos as i64 - state.read_pos as i64;

        if words_in_fifo < 0
            || (words_in_fifo == 0 && self.flags.contains(RipperFlags::FIFO_FULL))
        {
            words_in_fifo += state.size as i64;
        }

        words_in_fifo as u32 * WORD_BITS + state.bits_remaining
    }

    /// Block (via feeder calls) until the dipstick reaches `bits`.
    pub fn wait_on_dipstick(&mut self, bits: u32, fifo: &mut Fifo, feeder: &mut dyn StreamFeeder) {
        assert!(
            bits <= self.cur.size as u32 * WORD_BITS,
            "invalid dipstick depth"
        );

        while bits > self.read_dipstick() {
            feeder.fill(self, fifo);
        }
    }

    /// Park the true read position and enter aux state.
    pub fn save_main_state(&mut self) {
        self.main_backup = self.cur;
        self.flags.insert(RipperFlags::IN_AUX_STATE);
    }

    /// Return to the parked read position and leave aux state.
    pub fn restore_main_state(&mut self) {
        self.cur = self.main_backup;
        self.flags.remove(RipperFlags::IN_AUX_STATE);
    }

    /// Replace the current cursor with an externally stored state and leave
    /// aux state.
    pub fn load_main_state(&mut self, state: &RipperCursor) {
        self.cur = *state;
        self.flags.remove(RipperFlags::IN_AUX_STATE);
    }

    /// Copy the current cursor out for external storage. Does not change
    /// state.
    pub fn save_aux_state(&self) -> RipperCursor {
        self.cur
    }

    /// Replace the current cursor with an externally stored state without
    /// touching the aux flag.
    pub fn load_aux_state(&mut self, state: &RipperCursor) {
        self.cur = *state;
    }

    /// Total bit distance from `from` to `to`, correcting the word offset for
    /// FIFO wrap.
    ///
    /// The bit-level term is a plain signed difference of `bits_remaining`;
    /// when `from` holds fewer remaining bits than `to` the result comes out
    /// one word short of the intuitive distance. Callers rely on this exact
    /// arithmetic.
    pub fn bit_cnt_states(from: &RipperCursor, to: &RipperCursor) -> i32 {
        let bits_in_words = from.bits_remaining as i32 - to.bits_remaining as i32;

        let mut words_offset = to.read_pos as i32 - from.read_pos as i32;
        if words_offset < 0 {
            words_offset += from.size as i32;
        }

        words_offset * WORD_BITS as i32 + bits_in_words
    }

    /// Bit distance from the true main position (parked or current) to `to`.
    pub fn bit_cnt_main_state(&self, to: &RipperCursor) -> i32 {
        Self::bit_cnt_states(self.effective(), to)
    }

    /// Record the alignment of the bit `bits_offset` ahead of the cursor for
    /// a later realignment.
    pub fn save_alignment(&mut self, bits_offset: i32) {
        let mut alignment = self.cur.bits_remaining as i32 - bits_offset;

        if alignment < 0 {
            alignment = -alignment;
        }

        self.alignment_info = alignment as u32 & (WORD_BITS - 1);
    }

    /// Bits between the cursor and the saved alignment reference, before
    /// boundary masking.
    fn align_common(&self) -> i32 {
        self.cur.bits_remaining as i32 + WORD_BITS as i32 - self.alignment_info as i32
    }

    /// Skip forward to the next 8-bit boundary relative to the saved
    /// alignment reference.
    pub fn align_to_byte(&mut self, fifo: &mut Fifo, feeder: &mut dyn StreamFeeder) {
        let bits_to_skip = self.align_common() & 7;
        self.skip_bits(bits_to_skip, fifo, feeder);
    }

    /// Skip forward to the next 16-bit boundary relative to the saved
    /// alignment reference.
    pub fn align_to_word(&mut self, fifo: &mut Fifo, feeder: &mut dyn StreamFeeder) {
        let bits_to_skip = self.align_common() & 15;
        self.skip_bits(bits_to_skip, fifo, feeder);
    }

    /// Skip forward to the next 32-bit boundary relative to the saved
    /// alignment reference.
    pub fn align_to_dword(&mut self, fifo: &mut Fifo, feeder: &mut dyn StreamFeeder) {
        let bits_to_skip = self.align_common() & 31;
        self.skip_bits(bits_to_skip, fifo, feeder);
    }

    /// Producer side: commit `words` freshly written words.
    ///
    /// Wraps the write position and re-evaluates the full flag against the
    /// effective read position (the parked main cursor while in aux state).
    /// This is the only routine that raises `FIFO_FULL` on the producer path.
    pub fn advance_write_ptr(&mut self, words: usize) {
        self.write_pos += words;

        let effective = self.effective();
        let (read_pos, size) = (effective.read_pos, effective.size);

        if self.write_pos >= size {
            self.write_pos -= size;
        }

        self.flags.remove(RipperFlags::FIFO_FULL);

        if self.write_pos == read_pos {
            self.flags.insert(RipperFlags::FIFO_FULL);
        }
    }

    /// FIFO capacity minus the words currently occupied.
    pub fn free_space_in_words(&self) -> u32 {
        self.cur.size as u32 - self.read_dipstick() / WORD_BITS
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::{BitRipper, RipperFlags, StreamFeeder};
    use crate::config::WORD_BITS;
    use crate::fifo::{ring_add, Fifo};

    /// Feeds queued words in bursts, padding zeros once the queue drains.
    struct TestFeeder {
        words: VecDeque<u32>,
        fills: u32,
    }

    impl TestFeeder {
        fn new(words: &[u32]) -> TestFeeder {
            TestFeeder { words: words.iter().copied().collect(), fills: 0 }
        }
    }

    impl StreamFeeder for TestFeeder {
        fn fill(&mut self, ripper: &mut BitRipper, fifo: &mut Fifo) {
            self.fills += 1;

            let burst = (ripper.free_space_in_words() as usize).min(32);
            if burst == 0 {
                return;
            }

            let mut pos = ripper.write_pos();
            for _ in 0..burst {
                fifo[pos] = self.words.pop_front().unwrap_or(0);
                pos = ring_add(pos, 1, fifo.len());
            }

            ripper.advance_write_ptr(burst);
        }
    }

    /// Asserts that no refill is requested.
    struct NoFeeder;

    impl StreamFeeder for NoFeeder {
        fn fill(&mut self, _: &mut BitRipper, _: &mut Fifo) {
            panic!("unexpected FIFO refill");
        }
    }

    fn preloaded(words: &[u32], size: usize) -> (Fifo, BitRipper) {
        let mut fifo = Fifo::new(0, size);
        let mut ripper = BitRipper::new(&fifo);

        let mut pos = 0;
        for &word in words {
            fifo[pos] = word;
            pos = ring_add(pos, 1, size);
        }
        ripper.advance_write_ptr(words.len());

        (fifo, ripper)
    }

    #[test]
    fn verify_extract_bits() {
        let (mut fifo, mut ripper) = preloaded(&[0xa5a5_a5a5, 0x0f0f_0f0f], 16);
        let mut feeder = NoFeeder;

        assert_eq!(ripper.extract_bits(4, &mut fifo, &mut feeder), 0xa);
        assert_eq!(ripper.extract_bits(4, &mut fifo, &mut feeder), 0x5);
        assert_eq!(ripper.extract_bits(8, &mut fifo, &mut feeder), 0xa5);
        assert_eq!(ripper.extract_bits(16, &mut fifo, &mut feeder), 0xa5a5);
        assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), 0x0f0f_0f0f);
    }

    #[test]
    fn verify_extract_bits_across_words() {
        // A 20-bit field straddling a word boundary concatenates MSB-first.
        let (mut fifo, mut ripper) = preloaded(&[0x1234_5678, 0x9abc_def0], 16);
        let mut feeder = NoFeeder;

        assert_eq!(ripper.extract_bits(24, &mut fifo, &mut feeder), 0x12_3456);
        assert_eq!(ripper.extract_bits(20, &mut fifo, &mut feeder), 0x7_89ab);
        assert_eq!(ripper.extract_bits(20, &mut fifo, &mut feeder), 0xc_def0);
    }

    #[test]
    fn verify_extract_concatenation_recovers_stream() {
        // Property: extracts of varying widths re-concatenate to the source
        // bit stream.
        let words = [0xdead_beef, 0x0123_4567, 0x89ab_cdef, 0xfeed_f00d];
        let (mut fifo, mut ripper) = preloaded(&words, 16);
        let mut feeder = NoFeeder;

        let widths = [3, 11, 32, 1, 7, 25, 16, 13, 20];
        let total: u32 = widths.iter().sum();
        assert_eq!(total, 128);

        let mut stream = 0u128;
        for &width in &widths {
            let field = ripper.extract_bits(width, &mut fifo, &mut feeder);
            stream = (stream << width) | u128::from(field);
        }

        let mut expect = 0u128;
        for &word in &words {
            expect = (expect << 32) | u128::from(word);
        }

        assert_eq!(stream, expect);
    }

    #[test]
    fn verify_extract_waits_for_refill() {
        let mut fifo = Fifo::new(0, 64);
        let mut ripper = BitRipper::new(&fifo);
        let mut feeder = TestFeeder::new(&[0xcafe_babe, 0x8000_0001]);

        assert_eq!(ripper.extract_bits(16, &mut fifo, &mut feeder), 0xcafe);
        assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), 0xbabe_8000);
        assert!(feeder.fills >= 1);
    }

    #[test]
    fn verify_peek_matches_extract() {
        let words = [0xa5a5_a5a5, 0x5a5a_5a5a, 0x0f0f_0f0f];
        let (mut fifo, mut ripper) = preloaded(&words, 16);
        let mut feeder = NoFeeder;

        for &width in &[5, 27, 32, 9, 3] {
            let peeked = ripper.peek(width, &mut fifo, &mut feeder);
            let before = *ripper.cursor();

            let extracted = ripper.extract_bits(width, &mut fifo, &mut feeder);
            assert_eq!(peeked, extracted);

            // A peek mutates nothing: re-running the extract from the saved
            // cursor yields the same state transition.
            let after = *ripper.cursor();
            ripper.load_aux_state(&before);
            ripper.extract_bits(width, &mut fifo, &mut feeder);
            assert_eq!(*ripper.cursor(), after);
        }
    }

    #[test]
    fn verify_skip_bits_round_trip() {
        let words = [0x1111_2222, 0x3333_4444, 0x5555_6666, 0x7777_8888];
        let (mut fifo, mut ripper) = preloaded(&words, 16);
        let mut feeder = NoFeeder;

        ripper.extract_bits(13, &mut fifo, &mut feeder);
        let before = *ripper.cursor();

        for &skip in &[1, 7, 32, 45, 64] {
            ripper.skip_bits(skip, &mut fifo, &mut feeder);
            ripper.skip_bits(-skip, &mut fifo, &mut feeder);
            assert_eq!(*ripper.cursor(), before);
        }
    }

    #[test]
    fn verify_skip_bits_lands_on_expected_bit() {
        let (mut fifo, mut ripper) = preloaded(&[0x0000_0000, 0x8000_0000], 16);
        let mut feeder = NoFeeder;

        // Bit 32 is the first set bit in the stream.
        ripper.skip_bits(32, &mut fifo, &mut feeder);
        assert_eq!(ripper.extract_bits(1, &mut fifo, &mut feeder), 1);
        assert_eq!(ripper.extract_bits(31, &mut fifo, &mut feeder), 0);
    }

    #[test]
    fn verify_backward_skip_across_wrap() {
        // FIFO of 8 words, continuously fed: drive the read cursor past the
        // physical end, then rewind across the wrap and re-consume.
        let size = 8;
        let mut fifo = Fifo::new(0, size);
        let mut ripper = BitRipper::new(&fifo);

        let stream: Vec<u32> = (0..32u32).map(|i| 0x0101_0101u32.wrapping_mul(i)).collect();
        let mut feeder = TestFeeder::new(&stream);

        // Consume 12 words; the cursor wraps once (12 > 8).
        let mut consumed = Vec::new();
        for _ in 0..12 {
            consumed.push(ripper.extract_bits(32, &mut fifo, &mut feeder));
        }
        assert_eq!(consumed, stream[..12]);

        // Rewind 64 bits and re-extract the last two words.
        ripper.skip_bits(-64, &mut fifo, &mut feeder);
        assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), stream[10]);
        assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), stream[11]);
    }

    #[test]
    fn verify_backward_skip_across_wrap_full_size() {
        // Same rewind property at the production FIFO size.
        let size = crate::config::FIFO0_SIZE;
        let mut fifo = Fifo::new(0, size);
        let mut ripper = BitRipper::new(&fifo);

        let total = size + size / 2;
        let stream: Vec<u32> = (0..total as u32).map(|i| i ^ 0x5a5a_5a5a).collect();
        let mut feeder = TestFeeder::new(&stream);

        // Misalign by 7 bits, then consume past the physical end.
        ripper.skip_bits(7, &mut fifo, &mut feeder);
        for word in 0..total - 1 {
            let expect =
                (stream[word] << 7) | (stream[word + 1] >> 25);
            assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), expect);
        }

        // Rewind 64 bits across the wrap and re-consume.
        ripper.skip_bits(-64, &mut fifo, &mut feeder);
        for word in total - 3..total - 1 {
            let expect =
                (stream[word] << 7) | (stream[word + 1] >> 25);
            assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), expect);
        }
    }

    #[test]
    fn verify_peek_spanning_refill() {
        // A peek that reaches into an unfetched word triggers the feeder but
        // leaves the read cursor untouched.
        let mut fifo = Fifo::new(0, 16);
        let mut ripper = BitRipper::new(&fifo);
        let mut feeder = TestFeeder::new(&[0xdead_beef, 0x0123_4567]);

        assert_eq!(ripper.extract_bits(24, &mut fifo, &mut feeder), 0xdead_be);

        let cursor = *ripper.cursor();
        assert_eq!(ripper.peek(16, &mut fifo, &mut feeder), 0xef01);
        assert_eq!(*ripper.cursor(), cursor);

        assert_eq!(ripper.extract_bits(16, &mut fifo, &mut feeder), 0xef01);
    }

    #[test]
    fn verify_backward_skip_rearms_full_flag() {
        // Fill the FIFO completely, drain one word, then rewind onto the
        // write position: the cursor collision must read as "full", not
        // "empty".
        let size = 4;
        let (mut fifo, mut ripper) = preloaded(&[0x1, 0x2, 0x3, 0x4], size);
        let mut feeder = NoFeeder;

        assert!(ripper.flags().contains(RipperFlags::FIFO_FULL));
        assert_eq!(ripper.read_dipstick(), size as u32 * WORD_BITS);

        assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), 0x1);
        assert!(!ripper.flags().contains(RipperFlags::FIFO_FULL));

        ripper.skip_bits(-32, &mut fifo, &mut feeder);
        assert!(ripper.flags().contains(RipperFlags::FIFO_FULL));
        assert_eq!(ripper.read_dipstick(), size as u32 * WORD_BITS);
    }

    #[test]
    fn verify_dipstick_accounting() {
        let words = [0xffff_ffff; 6];
        let (mut fifo, mut ripper) = preloaded(&words, 16);
        let mut feeder = NoFeeder;

        let mut level = ripper.read_dipstick();
        assert_eq!(level, 6 * WORD_BITS);

        for &width in &[1, 31, 32, 5, 27, 32] {
            ripper.extract_bits(width, &mut fifo, &mut feeder);
            assert_eq!(ripper.read_dipstick(), level - width);
            level -= width;
        }
    }

    #[test]
    fn verify_wait_on_dipstick() {
        let mut fifo = Fifo::new(0, 64);
        let mut ripper = BitRipper::new(&fifo);
        let mut feeder = TestFeeder::new(&[0xaa; 40]);

        assert_eq!(ripper.read_dipstick(), 0);
        ripper.wait_on_dipstick(40 * WORD_BITS, &mut fifo, &mut feeder);
        assert!(ripper.read_dipstick() >= 40 * WORD_BITS);
    }

    #[test]
    fn verify_main_state_checkpoint() {
        let words = [0x0bad_f00d, 0x1357_9bdf, 0x2468_ace0];
        let (mut fifo, mut ripper) = preloaded(&words, 16);
        let mut feeder = NoFeeder;

        ripper.extract_bits(9, &mut fifo, &mut feeder);
        let parked = *ripper.cursor();

        ripper.save_main_state();
        assert!(ripper.in_aux_state());

        // Roam: arbitrary reads must not disturb the parked position.
        ripper.extract_bits(32, &mut fifo, &mut feeder);
        ripper.skip_bits(17, &mut fifo, &mut feeder);
        ripper.peek(8, &mut fifo, &mut feeder);

        ripper.restore_main_state();
        assert!(!ripper.in_aux_state());
        assert_eq!(*ripper.cursor(), parked);
    }

    #[test]
    fn verify_aux_state_preserves_dipstick() {
        let words = [0x1, 0x2, 0x3, 0x4, 0x5, 0x6];
        let (mut fifo, mut ripper) = preloaded(&words, 16);
        let mut feeder = NoFeeder;

        ripper.extract_bits(32, &mut fifo, &mut feeder);
        let level = ripper.read_dipstick();

        ripper.save_main_state();

        // The roaming cursor consumes, but the producer-visible fill level
        // tracks the parked main position.
        ripper.extract_bits(32, &mut fifo, &mut feeder);
        ripper.extract_bits(32, &mut fifo, &mut feeder);
        assert_eq!(ripper.read_dipstick(), level);

        ripper.restore_main_state();
        assert_eq!(ripper.read_dipstick(), level);
    }

    #[test]
    fn verify_external_state_slots() {
        let words = [0xaaaa_5555, 0x5555_aaaa, 0xf0f0_f0f0];
        let (mut fifo, mut ripper) = preloaded(&words, 16);
        let mut feeder = NoFeeder;

        ripper.extract_bits(6, &mut fifo, &mut feeder);
        let slot_a = ripper.save_aux_state();

        ripper.extract_bits(30, &mut fifo, &mut feeder);
        let slot_b = ripper.save_aux_state();

        // Park two positions and hop between them.
        ripper.load_aux_state(&slot_a);
        assert_eq!(ripper.extract_bits(30, &mut fifo, &mut feeder), {
            ripper.load_aux_state(&slot_b);
            ripper.skip_bits(-30, &mut fifo, &mut feeder);
            ripper.extract_bits(30, &mut fifo, &mut feeder)
        });

        // load_main_state clears the aux flag.
        ripper.save_main_state();
        assert!(ripper.in_aux_state());
        ripper.load_main_state(&slot_a);
        assert!(!ripper.in_aux_state());
        assert_eq!(ripper.cursor(), &slot_a);
    }

    #[test]
    fn verify_bit_cnt_states() {
        let words = [0x0; 8];
        let (mut fifo, mut ripper) = preloaded(&words, 8);
        let mut feeder = NoFeeder;

        ripper.extract_bits(5, &mut fifo, &mut feeder);
        let from = ripper.save_aux_state();

        ripper.extract_bits(32, &mut fifo, &mut feeder);
        ripper.extract_bits(10, &mut fifo, &mut feeder);
        let to = ripper.save_aux_state();

        assert_eq!(BitRipper::bit_cnt_states(&from, &to), 42);
        assert_eq!(ripper.bit_cnt_main_state(&to), 0);

        // Distance from the parked main state while roaming in aux mode.
        ripper.save_main_state();
        ripper.extract_bits(13, &mut fifo, &mut feeder);
        let roamed = ripper.save_aux_state();
        assert_eq!(ripper.bit_cnt_main_state(&roamed), 13);
        ripper.restore_main_state();
    }

    #[test]
    fn verify_bit_cnt_states_signed_quirk() {
        // The bit-level term is a plain signed subtraction: a `to` state
        // behind `from` in the same word reports a negative distance rather
        // than wrapping a whole word. Crossing a word boundary forward stays
        // exact because the read position advances with the load.
        let words = [0x0; 8];
        let (mut fifo, mut ripper) = preloaded(&words, 8);
        let mut feeder = NoFeeder;

        ripper.extract_bits(10, &mut fifo, &mut feeder);
        let to = ripper.save_aux_state(); // bits_remaining = 22

        ripper.extract_bits(20, &mut fifo, &mut feeder);
        let from = ripper.save_aux_state(); // bits_remaining = 2, same word

        assert_eq!(BitRipper::bit_cnt_states(&from, &to), -20);

        ripper.extract_bits(12, &mut fifo, &mut feeder);
        let next = ripper.save_aux_state(); // crossed into the next word

        assert_eq!(BitRipper::bit_cnt_states(&from, &next), 12);
    }

    #[test]
    fn verify_alignment_from_word_origin() {
        // Reference saved at the word origin: alignment is absolute within
        // the stream. After consuming 8 bits, aligning to a byte is a no-op
        // and the next extract returns the second byte of the first word.
        let (mut fifo, mut ripper) = preloaded(&[0xa5a5_a5a5; 4], 16);
        let mut feeder = NoFeeder;

        ripper.save_alignment(0);
        ripper.extract_bits(3, &mut fifo, &mut feeder);
        ripper.extract_bits(5, &mut fifo, &mut feeder);
        ripper.align_to_byte(&mut fifo, &mut feeder);

        assert_eq!(ripper.extract_bits(8, &mut fifo, &mut feeder), 0xa5);
    }

    #[test]
    fn verify_alignment_relative_reference() {
        // Reference saved mid-stream at bit 3: aligned positions are 3+8k.
        // After 5 more bits the cursor is 5 past the reference, so a byte
        // alignment skips 3 bits, landing 8 bits past the reference
        // (absolute bit 11).
        let (mut fifo, mut ripper) = preloaded(&[0xa5a5_a5a5; 4], 16);
        let mut feeder = NoFeeder;

        ripper.extract_bits(3, &mut fifo, &mut feeder);
        ripper.save_alignment(0);
        ripper.extract_bits(5, &mut fifo, &mut feeder);
        ripper.align_to_byte(&mut fifo, &mut feeder);

        // 0xa5a5a5a5 bits 11..19, MSB-first.
        assert_eq!(ripper.extract_bits(8, &mut fifo, &mut feeder), 0x2d);
    }

    #[test]
    fn verify_alignment_to_word_and_dword() {
        let (mut fifo, mut ripper) = preloaded(&[0x0123_4567, 0x89ab_cdef, 0x0123_4567], 16);
        let mut feeder = NoFeeder;

        ripper.save_alignment(0);
        ripper.extract_bits(7, &mut fifo, &mut feeder);
        ripper.align_to_word(&mut fifo, &mut feeder);
        assert_eq!(ripper.extract_bits(16, &mut fifo, &mut feeder), 0x4567);

        ripper.align_to_dword(&mut fifo, &mut feeder);
        assert_eq!(ripper.extract_bits(32, &mut fifo, &mut feeder), 0x89ab_cdef);
    }

    #[test]
    fn verify_advance_write_ptr_full_flag() {
        let mut fifo = Fifo::new(0, 4);
        let mut ripper = BitRipper::new(&fifo);
        let mut feeder = NoFeeder;

        ripper.advance_write_ptr(2);
        assert!(!ripper.flags().contains(RipperFlags::FIFO_FULL));
        assert_eq!(ripper.read_dipstick(), 2 * WORD_BITS);

        // Producer catches the reader: write == read means full.
        ripper.advance_write_ptr(2);
        assert!(ripper.flags().contains(RipperFlags::FIFO_FULL));
        assert_eq!(ripper.read_dipstick(), 4 * WORD_BITS);

        // Consuming a word clears the flag again.
        fifo[0] = 0;
        ripper.extract_bits(32, &mut fifo, &mut feeder);
        assert!(!ripper.flags().contains(RipperFlags::FIFO_FULL));
    }

    #[test]
    fn verify_advance_write_ptr_uses_parked_read_pos() {
        let words = [0x1, 0x2, 0x3, 0x4];
        let (mut fifo, mut ripper) = preloaded(&words[..2], 4);
        let mut feeder = NoFeeder;

        ripper.extract_bits(32, &mut fifo, &mut feeder);
        ripper.save_main_state();

        // Roam ahead of the parked cursor. The producer must compare against
        // the parked position, filling up to it and no further.
        ripper.extract_bits(32, &mut fifo, &mut feeder);

        ripper.advance_write_ptr(3);
        assert!(ripper.flags().contains(RipperFlags::FIFO_FULL));
        assert_eq!(ripper.free_space_in_words(), 0);
    }

    #[test]
    fn verify_free_space_in_words() {
        let mut fifo = Fifo::new(0, 16);
        let mut ripper = BitRipper::new(&fifo);
        let mut feeder = NoFeeder;

        assert_eq!(ripper.free_space_in_words(), 16);

        fifo[0] = 0xffff_ffff;
        fifo[1] = 0xffff_ffff;
        ripper.advance_write_ptr(2);
        assert_eq!(ripper.free_space_in_words(), 14);

        ripper.extract_bits(8, &mut fifo, &mut feeder);
        assert_eq!(ripper.free_space_in_words(), 15);
    }
}
