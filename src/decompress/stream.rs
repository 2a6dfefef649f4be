//! Input/output cursor pair shared by the streaming LZMA2, BCJ and XZ
//! decoders.

/// Caller-owned input and output windows plus how far each has been used.
///
/// Decoders advance `in_pos` and `out_pos`; the caller refills or grows the
/// buffers between calls.
#[derive(Debug)]
pub struct InOutBuffer<'i, 'o> {
    pub input: &'i [u8],
    pub in_pos: usize,
    pub output: &'o mut [u8],
    pub out_pos: usize,
}

impl<'i, 'o> InOutBuffer<'i, 'o> {
    pub fn new(input: &'i [u8], output: &'o mut [u8]) -> Self {
        Self {
            input,
            in_pos: 0,
            output,
            out_pos: 0,
        }
    }

    #[inline]
    pub fn in_remaining(&self) -> usize {
        self.input.len() - self.in_pos
    }

    #[inline]
    pub fn out_remaining(&self) -> usize {
        self.output.len() - self.out_pos
    }

    /// Bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.output[..self.out_pos]
    }
}

/// Non-error outcome of one streaming decoder call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XzStatus {
    /// More input or more output space is needed to continue.
    NeedMore,
    /// The stream (or LZMA2 payload) has been fully decoded.
    StreamEnd,
}
