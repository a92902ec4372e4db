//! Publication of channel values as MIDI or OSC messages
//!
//! [`EventSink`] owns the transports. An encoder with a MIDI controller
//! number publishes Control-Change; one with controller 0 falls back to its
//! OSC path. Transports are traits so backends (JACK ring, sequencer, UDP)
//! and test recorders plug in the same way.

use std::sync::Arc;

use crate::encoder::EncoderChannel;
use crate::error::TransportError;

/// RPN "null" parameter: deselects the current parameter
pub const RPN_NULL: u16 = 0x3FFF;

/// Controller numbers used for (N)RPN addressing and data entry
pub mod cc {
    pub const NRPN_LSB: u8 = 0x62;
    pub const NRPN_MSB: u8 = 0x63;
    pub const RPN_LSB: u8 = 0x64;
    pub const RPN_MSB: u8 = 0x65;
    pub const DATA_ENTRY_MSB: u8 = 0x06;
    pub const DATA_ENTRY_LSB: u8 = 0x26;
}

/// Rigid encoders with at least this step publish OSC booleans
pub const OSC_BOOL_MIN_STEP: u32 = 8;

/// Outbound MIDI message sink
pub trait MidiTransport: Send + Sync {
    fn send_control_change(&self, chan: u8, ctrl: u8, value: u8) -> Result<(), TransportError>;

    fn send_program_change(&self, chan: u8, program: u8) -> Result<(), TransportError>;
}

/// OSC message argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscArg {
    Int(i32),
    True,
    False,
}

impl From<bool> for OscArg {
    fn from(b: bool) -> Self {
        if b {
            OscArg::True
        } else {
            OscArg::False
        }
    }
}

/// Outbound OSC message sink
pub trait OscTransport: Send + Sync {
    fn send(&self, path: &str, arg: OscArg) -> Result<(), TransportError>;
}

/// Map an encoder value onto its OSC argument
///
/// Coarse rigid encoders (`step >= 8`) behave as toggles: the upper half of
/// the 7-bit range is `true`.
pub fn osc_arg_for(value: u32, step: u32) -> OscArg {
    if step >= OSC_BOOL_MIN_STEP {
        OscArg::from(value >= 64)
    } else {
        OscArg::Int(value.min(i32::MAX as u32) as i32)
    }
}

/// Routes published values to the configured transports
#[derive(Clone)]
pub struct EventSink {
    midi: Arc<dyn MidiTransport>,
    osc: Option<Arc<dyn OscTransport>>,
}

impl EventSink {
    pub fn new(midi: Arc<dyn MidiTransport>, osc: Option<Arc<dyn OscTransport>>) -> Self {
        Self { midi, osc }
    }

    /// Publish the current value of `channel`
    ///
    /// Nothing configured (no controller, no OSC path or transport) is a
    /// silent success.
    pub fn publish(&self, channel: &EncoderChannel) -> Result<(), TransportError> {
        let value = channel.value();
        let ctrl = channel.midi_ctrl();
        if ctrl > 0 {
            return self
                .midi
                .send_control_change(channel.midi_chan(), ctrl, (value & 0x7F) as u8);
        }

        let Some(osc) = self.osc.as_ref() else {
            return Ok(());
        };
        channel.with_osc_path(|path| match path {
            Some(path) => osc.send(path, osc_arg_for(value, channel.step())),
            None => Ok(()),
        })
    }

    /// Registered Parameter Number write: address then 14-bit data entry
    ///
    /// Stops at the first failed message. Selecting [`RPN_NULL`] only sends
    /// the address pair, since data entry after a null select is ignored by
    /// receivers.
    pub fn send_rpn(&self, chan: u8, rpn: u16, data: u16) -> Result<(), TransportError> {
        self.send_parameter(chan, cc::RPN_MSB, cc::RPN_LSB, rpn, data)
    }

    /// Non-Registered Parameter Number write, same shape as [`send_rpn`](Self::send_rpn)
    pub fn send_nrpn(&self, chan: u8, nrpn: u16, data: u16) -> Result<(), TransportError> {
        self.send_parameter(chan, cc::NRPN_MSB, cc::NRPN_LSB, nrpn, data)
    }

    pub fn send_program_change(&self, chan: u8, program: u8) -> Result<(), TransportError> {
        self.midi.send_program_change(chan & 0x0F, program & 0x7F)
    }

    fn send_parameter(
        &self,
        chan: u8,
        msb_ctrl: u8,
        lsb_ctrl: u8,
        param: u16,
        data: u16,
    ) -> Result<(), TransportError> {
        let chan = chan & 0x0F;
        let param = param & 0x3FFF;
        self.midi
            .send_control_change(chan, msb_ctrl, ((param >> 7) & 0x7F) as u8)?;
        self.midi
            .send_control_change(chan, lsb_ctrl, (param & 0x7F) as u8)?;
        if param == RPN_NULL {
            return Ok(());
        }
        self.midi
            .send_control_change(chan, cc::DATA_ENTRY_MSB, ((data >> 7) & 0x7F) as u8)?;
        self.midi
            .send_control_change(chan, cc::DATA_ENTRY_LSB, (data & 0x7F) as u8)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("osc", &self.osc.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording transports shared by the crate's tests

    use std::sync::Mutex;

    use super::*;

    /// Route `log` output through the test harness; set RUST_LOG to see it
    pub fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A MIDI message captured by [`RecordingMidi`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Sent {
        Cc(u8, u8, u8),
        Pc(u8, u8),
    }

    /// Records every message; fails once `fail_after` messages were accepted
    #[derive(Default)]
    pub struct RecordingMidi {
        pub sent: Mutex<Vec<Sent>>,
        pub fail_after: Option<usize>,
    }

    impl RecordingMidi {
        pub fn failing_after(n: usize) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_after: Some(n),
            }
        }

        pub fn messages(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, msg: Sent) -> Result<(), TransportError> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_after.is_some_and(|n| sent.len() >= n) {
                return Err(TransportError::Overflow);
            }
            sent.push(msg);
            Ok(())
        }
    }

    impl MidiTransport for RecordingMidi {
        fn send_control_change(&self, chan: u8, ctrl: u8, value: u8) -> Result<(), TransportError> {
            self.record(Sent::Cc(chan, ctrl, value))
        }

        fn send_program_change(&self, chan: u8, program: u8) -> Result<(), TransportError> {
            self.record(Sent::Pc(chan, program))
        }
    }

    #[derive(Default)]
    pub struct RecordingOsc {
        pub sent: Mutex<Vec<(String, OscArg)>>,
    }

    impl RecordingOsc {
        pub fn messages(&self) -> Vec<(String, OscArg)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl OscTransport for RecordingOsc {
        fn send(&self, path: &str, arg: OscArg) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((path.to_string(), arg));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingMidi, RecordingOsc, Sent};
    use super::*;
    use crate::encoder::EncoderSetup;

    fn encoder(ctrl: u8, osc_path: Option<&str>, value: u32, step: u32) -> EncoderChannel {
        let ch = EncoderChannel::new();
        ch.configure(&EncoderSetup {
            pin_a: 5,
            pin_b: 6,
            midi_chan: 3,
            midi_ctrl: ctrl,
            osc_path: osc_path.map(str::to_string),
            value,
            max_value: 127,
            step,
        });
        ch
    }

    fn sink() -> (Arc<RecordingMidi>, Arc<RecordingOsc>, EventSink) {
        let midi = Arc::new(RecordingMidi::default());
        let osc = Arc::new(RecordingOsc::default());
        let sink = EventSink::new(midi.clone(), Some(osc.clone()));
        (midi, osc, sink)
    }

    #[test]
    fn test_midi_controller_publishes_cc() {
        let (midi, osc, sink) = sink();
        sink.publish(&encoder(74, Some("/ignored"), 100, 0)).unwrap();
        assert_eq!(midi.messages(), vec![Sent::Cc(3, 74, 100)]);
        assert!(osc.messages().is_empty());
    }

    #[test]
    fn test_coarse_step_publishes_osc_bool() {
        let (midi, osc, sink) = sink();
        let ch = encoder(0, Some("/mixer/mute"), 70, 8);
        sink.publish(&ch).unwrap();
        ch.set_value(50);
        sink.publish(&ch).unwrap();

        assert!(midi.messages().is_empty());
        assert_eq!(
            osc.messages(),
            vec![
                ("/mixer/mute".to_string(), OscArg::True),
                ("/mixer/mute".to_string(), OscArg::False),
            ]
        );
    }

    #[test]
    fn test_fine_step_publishes_osc_int() {
        let (_midi, osc, sink) = sink();
        sink.publish(&encoder(0, Some("/fx/depth"), 42, 3)).unwrap();
        assert_eq!(
            osc.messages(),
            vec![("/fx/depth".to_string(), OscArg::Int(42))]
        );
    }

    #[test]
    fn test_nothing_configured_is_a_no_op() {
        let (midi, osc, sink) = sink();
        assert!(sink.publish(&encoder(0, None, 10, 0)).is_ok());

        let no_osc = EventSink::new(midi.clone(), None);
        assert!(no_osc.publish(&encoder(0, Some("/x"), 10, 0)).is_ok());

        assert!(midi.messages().is_empty());
        assert!(osc.messages().is_empty());
    }

    #[test]
    fn test_rpn_sends_address_then_data() {
        let (midi, _osc, sink) = sink();
        sink.send_rpn(2, 0x0001, 0x2000).unwrap();
        assert_eq!(
            midi.messages(),
            vec![
                Sent::Cc(2, 0x65, 0x00),
                Sent::Cc(2, 0x64, 0x01),
                Sent::Cc(2, 0x06, 0x40),
                Sent::Cc(2, 0x26, 0x00),
            ]
        );
    }

    #[test]
    fn test_rpn_stops_on_first_failure() {
        let midi = Arc::new(RecordingMidi::failing_after(1));
        let sink = EventSink::new(midi.clone(), None);
        assert_eq!(sink.send_rpn(0, 5, 5), Err(TransportError::Overflow));
        assert_eq!(midi.messages(), vec![Sent::Cc(0, 0x65, 0)]);
    }

    #[test]
    fn test_rpn_null_sends_only_address() {
        let (midi, _osc, sink) = sink();
        sink.send_rpn(0, RPN_NULL, 0x1234).unwrap();
        assert_eq!(
            midi.messages(),
            vec![Sent::Cc(0, 0x65, 0x7F), Sent::Cc(0, 0x64, 0x7F)]
        );
    }

    #[test]
    fn test_nrpn_uses_nrpn_controllers() {
        let (midi, _osc, sink) = sink();
        sink.send_nrpn(1, 0x0105, 0x007F).unwrap();
        assert_eq!(
            midi.messages(),
            vec![
                Sent::Cc(1, 0x63, 0x02),
                Sent::Cc(1, 0x62, 0x05),
                Sent::Cc(1, 0x06, 0x00),
                Sent::Cc(1, 0x26, 0x7F),
            ]
        );
    }

    #[test]
    fn test_program_change_masks_bytes() {
        let (midi, _osc, sink) = sink();
        sink.send_program_change(0x12, 0x85).unwrap();
        assert_eq!(midi.messages(), vec![Sent::Pc(0x02, 0x05)]);
    }
}
