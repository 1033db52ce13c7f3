//! UART byte-stream interface
//!
//! The hart only sees the UART through the ready/valid contract in
//! the [Uart] trait: it can push a byte out, look at the byte waiting
//! to be read (if any), and acknowledge it once consumed. Which
//! transport sits behind the trait is chosen when the hart is
//! constructed.
//!
//! [BufferedUart] keeps both directions in in-memory queues and is
//! what tests use. [ChannelUart] connects the hart to a host thread
//! through channels, which is how the `emulate` binary talks to the
//! terminal.

use std::fmt::Debug;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use queues::*;

pub trait Uart: Debug + Send {
    /// Transmit a byte (the hart asserted write-valid with this data)
    fn write(&mut self, byte: u8);

    /// The byte offered on the read side, or None if nothing is
    /// available (read-valid low)
    fn peek(&mut self) -> Option<u8>;

    /// Consume the byte returned by the last peek (read-ready
    /// acknowledgement). Does nothing if no byte is available.
    fn ack(&mut self);
}

/// UART double backed by two queues
#[derive(Debug, Default)]
pub struct BufferedUart {
    rx: Queue<u8>,
    tx: Queue<u8>,
}

impl BufferedUart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a UART with input already waiting to be read
    pub fn with_input(input: &[u8]) -> Self {
        let mut uart = Self::default();
        uart.push_input(input);
        uart
    }

    /// Queue bytes for the hart to read
    pub fn push_input(&mut self, input: &[u8]) {
        for &byte in input {
            // Queue::add never fails for an unbounded queue
            let _ = self.rx.add(byte);
        }
    }

    /// Return everything the hart has transmitted so far, and
    /// empty the transmit buffer
    pub fn flush_output(&mut self) -> Vec<u8> {
        let mut output = Vec::with_capacity(self.tx.size());
        while let Ok(byte) = self.tx.remove() {
            output.push(byte);
        }
        output
    }

    /// Like flush_output, but interpret the bytes as (lossy) UTF-8
    pub fn flush_string(&mut self) -> String {
        String::from_utf8_lossy(&self.flush_output()).into_owned()
    }
}

impl Uart for BufferedUart {
    fn write(&mut self, byte: u8) {
        let _ = self.tx.add(byte);
    }

    fn peek(&mut self) -> Option<u8> {
        self.rx.peek().ok()
    }

    fn ack(&mut self) {
        let _ = self.rx.remove();
    }
}

/// UART whose two directions are channels to a host thread
///
/// Bytes written by the hart are sent on the output channel. Bytes
/// arriving on the input channel are offered to the hart one at a
/// time. If the host hangs up either end the UART keeps working: the
/// transmitted bytes are dropped and no more input arrives.
#[derive(Debug)]
pub struct ChannelUart {
    tx: Sender<u8>,
    rx: Receiver<u8>,
    pending: Option<u8>,
}

impl ChannelUart {
    /// Make the UART, returning the host's ends of the two channels
    /// as (input sender, output receiver)
    pub fn new() -> (Self, Sender<u8>, Receiver<u8>) {
        let (input_tx, input_rx) = mpsc::channel();
        let (output_tx, output_rx) = mpsc::channel();
        let uart = Self {
            tx: output_tx,
            rx: input_rx,
            pending: None,
        };
        (uart, input_tx, output_rx)
    }
}

impl Uart for ChannelUart {
    fn write(&mut self, byte: u8) {
        if self.tx.send(byte).is_err() {
            log::trace!("uart output dropped (host hung up): 0x{byte:02x}");
        }
    }

    fn peek(&mut self) -> Option<u8> {
        if self.pending.is_none() {
            match self.rx.try_recv() {
                Ok(byte) => self.pending = Some(byte),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => (),
            }
        }
        self.pending
    }

    fn ack(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn check_buffered_output_order() {
        let mut uart = BufferedUart::new();
        for byte in b"hi!" {
            uart.write(*byte);
        }
        assert_eq!(uart.flush_string(), "hi!");
        assert!(uart.flush_output().is_empty());
    }

    #[test]
    fn check_buffered_input_peek_and_ack() {
        let mut uart = BufferedUart::with_input(b"ab");
        assert_eq!(uart.peek(), Some(b'a'));
        // Peeking does not consume
        assert_eq!(uart.peek(), Some(b'a'));
        uart.ack();
        assert_eq!(uart.peek(), Some(b'b'));
        uart.ack();
        assert_eq!(uart.peek(), None);
        // Acknowledging with nothing available is harmless
        uart.ack();
        assert_eq!(uart.peek(), None);
    }

    #[test]
    fn check_channel_uart_both_directions() {
        let (mut uart, input, output) = ChannelUart::new();
        assert_eq!(uart.peek(), None);
        input.send(b'x').unwrap();
        input.send(b'y').unwrap();
        assert_eq!(uart.peek(), Some(b'x'));
        uart.ack();
        assert_eq!(uart.peek(), Some(b'y'));
        uart.ack();
        assert_eq!(uart.peek(), None);

        uart.write(b'z');
        assert_eq!(output.recv().unwrap(), b'z');
    }

    #[test]
    fn check_channel_uart_survives_hangup() {
        let (mut uart, input, output) = ChannelUart::new();
        drop(input);
        drop(output);
        uart.write(b'q');
        assert_eq!(uart.peek(), None);
    }
}
