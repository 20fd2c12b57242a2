//! Named operations a session can perform.
//!
//! A [`NodeOp`] is a command without the node-specific parts: `setid` and
//! `cmpid` pick up the identity of whichever session runs them, so the same
//! op can be fanned out to a whole fleet.

use crate::error::{FleetError, Result};
use crate::frame::protocol::{BurstParams, Command, CommandKind, Modulation, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOp {
    SetId,
    CmpId,
    ResetRx,
    SetFreq(u32),
    SetChanBw { exponent: u8, mantissa: u8 },
    SetDrate { exponent: u8, mantissa: u8 },
    SetMod(Modulation),
    SetTxPow(u8),
    Send(BurstParams),
}

impl NodeOp {
    pub fn kind(&self) -> CommandKind {
        match self {
            NodeOp::SetId => CommandKind::SetId,
            NodeOp::CmpId => CommandKind::CmpId,
            NodeOp::ResetRx => CommandKind::ResetRx,
            NodeOp::SetFreq(_) => CommandKind::SetFreq,
            NodeOp::SetChanBw { .. } => CommandKind::SetChanBw,
            NodeOp::SetDrate { .. } => CommandKind::SetDrate,
            NodeOp::SetMod(_) => CommandKind::SetMod,
            NodeOp::SetTxPow(_) => CommandKind::SetTxPow,
            NodeOp::Send(_) => CommandKind::Send,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Build the command for the node with identity `id`
    ///
    /// # Errors
    ///
    /// Returns error if a field does not fit its wire encoding
    pub fn to_command(&self, id: NodeId) -> Result<Command> {
        Ok(match *self {
            NodeOp::SetId => Command::setid(id),
            NodeOp::CmpId => Command::cmpid(id),
            NodeOp::ResetRx => Command::resetrx(),
            NodeOp::SetFreq(freq) => Command::setfreq(freq)?,
            NodeOp::SetChanBw { exponent, mantissa } => Command::setchanbw(exponent, mantissa),
            NodeOp::SetDrate { exponent, mantissa } => Command::setdrate(exponent, mantissa),
            NodeOp::SetMod(modulation) => Command::setmod(modulation),
            NodeOp::SetTxPow(register) => Command::settxpow(register),
            NodeOp::Send(burst) => Command::send(burst),
        })
    }

    /// Build an op from a command name and its numeric fields
    ///
    /// | name        | fields                                   |
    /// |-------------|------------------------------------------|
    /// | `setid`     | none (uses the session identity)         |
    /// | `cmpid`     | none (uses the session identity)         |
    /// | `resetrx`   | none                                     |
    /// | `setfreq`   | frequency word (24 bits)                 |
    /// | `setchanbw` | exponent, mantissa                       |
    /// | `setdrate`  | exponent, mantissa                       |
    /// | `setmod`    | modulation code (0 = 2FSK .. 3 = MSK)    |
    /// | `settxpow`  | PA register                              |
    /// | `send`      | burst id, [length], [period], [payload]  |
    ///
    /// # Errors
    ///
    /// Returns error if the name is unknown, the field count is wrong, or a
    /// field is out of range
    pub fn parse(name: &str, args: &[u32]) -> Result<Self> {
        let kind = CommandKind::from_name(name)
            .ok_or_else(|| FleetError::Protocol(format!("{} is not a valid command", name)))?;

        let arity = |count: usize| -> Result<()> {
            if args.len() == count {
                Ok(())
            } else {
                Err(FleetError::Protocol(format!(
                    "{} takes {} fields, got {}",
                    name,
                    count,
                    args.len()
                )))
            }
        };

        let op = match kind {
            CommandKind::SetId => {
                arity(0)?;
                NodeOp::SetId
            }
            CommandKind::CmpId => {
                arity(0)?;
                NodeOp::CmpId
            }
            CommandKind::ResetRx => {
                arity(0)?;
                NodeOp::ResetRx
            }
            CommandKind::SetFreq => {
                arity(1)?;
                NodeOp::SetFreq(args[0])
            }
            CommandKind::SetChanBw => {
                arity(2)?;
                NodeOp::SetChanBw { exponent: byte(name, args[0])?, mantissa: byte(name, args[1])? }
            }
            CommandKind::SetDrate => {
                arity(2)?;
                NodeOp::SetDrate { exponent: byte(name, args[0])?, mantissa: byte(name, args[1])? }
            }
            CommandKind::SetMod => {
                arity(1)?;
                let code = byte(name, args[0])?;
                let modulation = Modulation::from_code(code).ok_or_else(|| {
                    FleetError::Protocol(format!("unknown modulation code {}", code))
                })?;
                NodeOp::SetMod(modulation)
            }
            CommandKind::SetTxPow => {
                arity(1)?;
                NodeOp::SetTxPow(byte(name, args[0])?)
            }
            CommandKind::Send => {
                if args.is_empty() || args.len() > 4 {
                    return Err(FleetError::Protocol(format!(
                        "send takes 1 to 4 fields, got {}",
                        args.len()
                    )));
                }

                let mut burst = BurstParams::new(word(name, args[0])?);
                if let Some(&len) = args.get(1) {
                    burst.burst_len = word(name, len)?;
                }
                if let Some(&period) = args.get(2) {
                    burst.period = word(name, period)?;
                }
                if let Some(&payload) = args.get(3) {
                    burst.payload = byte(name, payload)?;
                }
                NodeOp::Send(burst)
            }
        };

        // Catch range errors (setfreq) at parse time rather than per node
        op.to_command(0)?;
        Ok(op)
    }
}

fn byte(name: &str, value: u32) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| FleetError::Protocol(format!("{}: field {} does not fit in a byte", name, value)))
}

fn word(name: &str, value: u32) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| FleetError::Protocol(format!("{}: field {} does not fit in 16 bits", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ops_use_session_id() {
        assert_eq!(NodeOp::SetId.to_command(0x0203).unwrap(), Command::setid(0x0203));
        assert_eq!(NodeOp::CmpId.to_command(9).unwrap().args(), &[0x00, 0x09]);
    }

    #[test]
    fn test_parse_simple_ops() {
        assert_eq!(NodeOp::parse("resetrx", &[]).unwrap(), NodeOp::ResetRx);
        assert_eq!(NodeOp::parse("settxpow", &[0xC2]).unwrap(), NodeOp::SetTxPow(0xC2));
        assert_eq!(
            NodeOp::parse("setdrate", &[10, 0x83]).unwrap(),
            NodeOp::SetDrate { exponent: 10, mantissa: 0x83 }
        );
        assert_eq!(NodeOp::parse("setmod", &[2]).unwrap(), NodeOp::SetMod(Modulation::Ask));
    }

    #[test]
    fn test_parse_send_defaults() {
        let op = NodeOp::parse("send", &[4]).unwrap();
        assert_eq!(op, NodeOp::Send(BurstParams::new(4)));

        let op = NodeOp::parse("send", &[4, 16384, 5, 0xAA]).unwrap();
        assert_eq!(
            op,
            NodeOp::Send(BurstParams { burst_id: 4, burst_len: 16384, period: 5, payload: 0xAA })
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(NodeOp::parse("warp", &[]).is_err());
        assert!(NodeOp::parse("resetrx", &[1]).is_err());
        assert!(NodeOp::parse("settxpow", &[256]).is_err());
        assert!(NodeOp::parse("setmod", &[4]).is_err());
        assert!(NodeOp::parse("setfreq", &[0x0100_0000]).is_err());
        assert!(NodeOp::parse("send", &[]).is_err());
        assert!(NodeOp::parse("send", &[1, 70000]).is_err());
    }

    #[test]
    fn test_names_follow_catalog() {
        assert_eq!(NodeOp::SetTxPow(0).name(), "settxpow");
        assert_eq!(NodeOp::Send(BurstParams::new(1)).name(), "send");
    }
}
