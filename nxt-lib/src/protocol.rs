//! The command catalog: one method per telegram the brick understands.
//!
//! Every method builds the exact request layout, runs the exchange, and
//! parses the typed reply. Commands that echo back a port, handle or module
//! id verify the echo and fail on a mismatch — a wrong echo means the
//! request/reply stream is desynchronized and the call must not be trusted.
//!
//! Two lookups deliberately swallow specific statuses: `find_first`/`find_next`
//! translate `FileNotFound` into `None`, and the module listing translates
//! `ModuleNotFound`/`NoMoreHandles` into `None`. Every other non-success
//! status propagates as [`NxtError::CommandFailed`].

use bytes::{Buf, Bytes};
use zerocopy::FromBytes;

use crate::codec;
use crate::connection::{Connection, Transport};
use crate::constants::{
    BRICK_NAME_FIELD, FILE_NAME_FIELD, LS_MAX_PAYLOAD, MAX_BRICK_NAME, MAX_FILE_NAME, MAX_MESSAGE,
};
use crate::error::NxtError;
use crate::telegram::{DirectOpcode, Reply, StatusCode, SystemOpcode, Telegram};
use crate::types::{
    DeviceInfo, DeviceInfoRaw, FileInfo, FileInfoRaw, FirmwareVersion, FirmwareVersionRaw,
    InputValues, InputValuesRaw, ModuleId, ModuleInfo, ModuleInfoRaw, OutputMode, OutputPort,
    OutputState, OutputStateRaw, RegulationMode, RunState, SensorMode, SensorPort, SensorType,
};

fn parse_payload<'a, R>(reply: &'a Reply, what: &str) -> Result<&'a R, NxtError>
where
    R: FromBytes + zerocopy::KnownLayout + zerocopy::Immutable + zerocopy::Unaligned,
{
    R::ref_from_bytes(reply.payload())
        .map_err(|_| NxtError::InvalidReply(format!("{what} reply has wrong size")))
}

impl<T: Transport> Connection<T> {
    // --- program control -------------------------------------------------

    /// Start a program stored on the brick.
    pub async fn start_program(&mut self, name: &str) -> Result<(), NxtError> {
        codec::validate_name(name, MAX_FILE_NAME)?;
        let mut t = Telegram::direct(DirectOpcode::StartProgram, self.reply_required());
        t.put_name(name, FILE_NAME_FIELD);
        self.run_command(t).await
    }

    /// Stop the running program, if any.
    pub async fn stop_program(&mut self) -> Result<(), NxtError> {
        let t = Telegram::direct(DirectOpcode::StopProgram, self.reply_required());
        self.run_command(t).await
    }

    /// Play a sound file stored on the brick.
    pub async fn play_sound_file(&mut self, looping: bool, name: &str) -> Result<(), NxtError> {
        codec::validate_name(name, MAX_FILE_NAME)?;
        let mut t = Telegram::direct(DirectOpcode::PlaySoundFile, self.reply_required());
        t.put_bool(looping);
        t.put_name(name, FILE_NAME_FIELD);
        self.run_command(t).await
    }

    /// Play a tone. Frequency in Hz, duration in milliseconds.
    pub async fn play_tone(&mut self, frequency: u16, duration_ms: u16) -> Result<(), NxtError> {
        let mut t = Telegram::direct(DirectOpcode::PlayTone, self.reply_required());
        t.put_u16(frequency);
        t.put_u16(duration_ms);
        self.run_command(t).await
    }

    pub async fn stop_sound_playback(&mut self) -> Result<(), NxtError> {
        let t = Telegram::direct(DirectOpcode::StopSoundPlayback, self.reply_required());
        self.run_command(t).await
    }

    // --- actuator control ------------------------------------------------

    /// Command one motor port. Power and turn ratio are clamped to
    /// [-100, 100] before framing.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_output_state(
        &mut self,
        port: OutputPort,
        power: i32,
        mode: OutputMode,
        regulation: RegulationMode,
        turn_ratio: i32,
        run_state: RunState,
        tacho_limit: u32,
    ) -> Result<(), NxtError> {
        let mut t = Telegram::direct(DirectOpcode::SetOutputState, self.reply_required());
        t.put_u8(port.into());
        t.put_i8(power.clamp(-100, 100) as i8);
        t.put_u8(mode.bits());
        t.put_u8(regulation.into());
        t.put_i8(turn_ratio.clamp(-100, 100) as i8);
        t.put_u8(run_state.into());
        t.put_u32(tacho_limit);
        self.run_command(t).await
    }

    /// Read back the full output state of a motor port.
    pub async fn get_output_state(&mut self, port: OutputPort) -> Result<OutputState, NxtError> {
        let mut t = Telegram::direct(DirectOpcode::GetOutputState, true);
        t.put_u8(port.into());
        let reply = self.exchange(t).await?;
        let raw: &OutputStateRaw = parse_payload(&reply, "output-state")?;
        if raw.port != u8::from(port) {
            return Err(NxtError::PortEchoMismatch {
                requested: port.into(),
                answered: raw.port,
            });
        }
        Ok(OutputState::from(raw))
    }

    /// Reset a motor's position counter. `relative` resets the block-relative
    /// counter instead of the program-relative one.
    pub async fn reset_motor_position(
        &mut self,
        port: OutputPort,
        relative: bool,
    ) -> Result<(), NxtError> {
        let mut t = Telegram::direct(DirectOpcode::ResetMotorPosition, self.reply_required());
        t.put_u8(port.into());
        t.put_bool(relative);
        self.run_command(t).await
    }

    // --- sensor control --------------------------------------------------

    /// Configure the type and mode of a sensor port. Must be sent before
    /// readings from that port are meaningful.
    pub async fn set_input_mode(
        &mut self,
        port: SensorPort,
        sensor_type: SensorType,
        mode: SensorMode,
    ) -> Result<(), NxtError> {
        let mut t = Telegram::direct(DirectOpcode::SetInputMode, self.reply_required());
        t.put_u8(port.into());
        t.put_u8(sensor_type.into());
        t.put_u8(mode.into());
        self.run_command(t).await
    }

    /// Read the current values of a sensor port.
    pub async fn get_input_values(&mut self, port: SensorPort) -> Result<InputValues, NxtError> {
        let mut t = Telegram::direct(DirectOpcode::GetInputValues, true);
        t.put_u8(port.into());
        let reply = self.exchange(t).await?;
        let raw: &InputValuesRaw = parse_payload(&reply, "input-values")?;
        if raw.port != u8::from(port) {
            return Err(NxtError::PortEchoMismatch {
                requested: port.into(),
                answered: raw.port,
            });
        }
        Ok(InputValues::from(raw))
    }

    pub async fn reset_input_scaled_value(&mut self, port: SensorPort) -> Result<(), NxtError> {
        let mut t = Telegram::direct(DirectOpcode::ResetInputScaledValue, self.reply_required());
        t.put_u8(port.into());
        self.run_command(t).await
    }

    // --- low-speed (I2C) passthrough -------------------------------------

    /// Number of bytes waiting in a port's low-speed receive buffer.
    pub async fn ls_get_status(&mut self, port: SensorPort) -> Result<u8, NxtError> {
        let mut t = Telegram::direct(DirectOpcode::LsGetStatus, true);
        t.put_u8(port.into());
        let reply = self.exchange(t).await?;
        Ok(reply.require(1)?[0])
    }

    /// Start a low-speed transaction: write `tx` to the digital device on
    /// `port` and ask for `rx_len` answer bytes.
    pub async fn ls_write(
        &mut self,
        port: SensorPort,
        tx: &[u8],
        rx_len: u8,
    ) -> Result<(), NxtError> {
        if tx.len() > LS_MAX_PAYLOAD {
            return Err(NxtError::PayloadTooLarge {
                len: tx.len(),
                max: LS_MAX_PAYLOAD,
            });
        }
        if usize::from(rx_len) > LS_MAX_PAYLOAD {
            return Err(NxtError::PayloadTooLarge {
                len: rx_len.into(),
                max: LS_MAX_PAYLOAD,
            });
        }
        let mut t = Telegram::direct(DirectOpcode::LsWrite, self.reply_required());
        t.put_u8(port.into());
        t.put_u8(tx.len() as u8);
        t.put_u8(rx_len);
        t.put_bytes(tx);
        self.run_command(t).await
    }

    /// Drain the answer bytes of a low-speed transaction.
    pub async fn ls_read(&mut self, port: SensorPort) -> Result<Bytes, NxtError> {
        let mut t = Telegram::direct(DirectOpcode::LsRead, true);
        t.put_u8(port.into());
        let reply = self.exchange(t).await?;
        let payload = reply.require(1 + LS_MAX_PAYLOAD)?;
        let n = usize::from(payload[0]);
        if n > LS_MAX_PAYLOAD {
            return Err(NxtError::InvalidReply(format!(
                "low-speed read reports {n} bytes"
            )));
        }
        Ok(Bytes::copy_from_slice(&payload[1..1 + n]))
    }

    // --- system queries --------------------------------------------------

    /// Battery voltage in millivolts.
    pub async fn get_battery_level(&mut self) -> Result<u16, NxtError> {
        let t = Telegram::direct(DirectOpcode::GetBatteryLevel, true);
        let reply = self.exchange(t).await?;
        let mut p = reply.require(2)?;
        Ok(p.get_u16_le())
    }

    /// Reset the brick's sleep timer; the reply carries the configured sleep
    /// timeout in milliseconds (0 means the brick never sleeps).
    pub async fn keep_alive(&mut self) -> Result<u32, NxtError> {
        let t = Telegram::direct(DirectOpcode::KeepAlive, true);
        let reply = self.exchange(t).await?;
        let mut p = reply.require(4)?;
        Ok(p.get_u32_le())
    }

    /// Name of the running program; the brick answers `NoActiveProgram`
    /// when nothing is running.
    pub async fn get_current_program_name(&mut self) -> Result<String, NxtError> {
        let t = Telegram::direct(DirectOpcode::GetCurrentProgramName, true);
        let reply = self.exchange(t).await?;
        Ok(codec::parse_name(reply.require(FILE_NAME_FIELD)?))
    }

    pub async fn get_firmware_version(&mut self) -> Result<FirmwareVersion, NxtError> {
        let t = Telegram::system(SystemOpcode::GetFirmwareVersion, true);
        let reply = self.exchange(t).await?;
        let raw: &FirmwareVersionRaw = parse_payload(&reply, "firmware-version")?;
        Ok(FirmwareVersion::from(raw))
    }

    pub async fn get_device_info(&mut self) -> Result<DeviceInfo, NxtError> {
        let t = Telegram::system(SystemOpcode::GetDeviceInfo, true);
        let reply = self.exchange(t).await?;
        let raw: &DeviceInfoRaw = parse_payload(&reply, "device-info")?;
        Ok(DeviceInfo::from(raw))
    }

    /// Rename the brick. Names are capped at 15 ASCII characters.
    pub async fn set_brick_name(&mut self, name: &str) -> Result<(), NxtError> {
        codec::validate_name(name, MAX_BRICK_NAME)?;
        let mut t = Telegram::system(SystemOpcode::SetBrickName, self.reply_required());
        t.put_name(name, BRICK_NAME_FIELD);
        self.run_command(t).await
    }

    /// Erase every user file on the brick. Takes a few seconds on the device.
    pub async fn delete_user_flash(&mut self) -> Result<(), NxtError> {
        let t = Telegram::system(SystemOpcode::DeleteUserFlash, true);
        self.exchange(t).await?;
        Ok(())
    }

    /// Jump to the firmware boot loader. Only reachable over USB, which this
    /// crate does not implement.
    pub async fn boot(&mut self) -> Result<(), NxtError> {
        Err(NxtError::UsbOnly)
    }

    /// Reset the Bluetooth chip to factory settings. The brick refuses this
    /// over Bluetooth itself, so it is only reachable over USB.
    pub async fn bluetooth_factory_reset(&mut self) -> Result<(), NxtError> {
        Err(NxtError::UsbOnly)
    }

    // --- mailboxes -------------------------------------------------------

    /// Write a message into one of the brick's ten inboxes.
    pub async fn message_write(&mut self, inbox: u8, message: &str) -> Result<(), NxtError> {
        if inbox > 9 {
            return Err(NxtError::OutOfRange {
                what: "inbox",
                value: inbox.into(),
                min: 0,
                max: 9,
            });
        }
        if message.len() > MAX_MESSAGE {
            return Err(NxtError::MessageTooLong {
                len: message.len(),
                max: MAX_MESSAGE,
            });
        }
        let mut t = Telegram::direct(DirectOpcode::MessageWrite, self.reply_required());
        t.put_u8(inbox);
        t.put_u8(message.len() as u8 + 1);
        t.put_bytes(message.as_bytes());
        t.put_u8(0);
        self.run_command(t).await
    }

    /// Read a message from a remote inbox into a local one. `remove` pops the
    /// message from the queue. An empty mailbox surfaces as a `MailboxEmpty`
    /// fault.
    pub async fn message_read(
        &mut self,
        remote_inbox: u8,
        local_inbox: u8,
        remove: bool,
    ) -> Result<String, NxtError> {
        let mut t = Telegram::direct(DirectOpcode::MessageRead, true);
        t.put_u8(remote_inbox);
        t.put_u8(local_inbox);
        t.put_bool(remove);
        let reply = self.exchange(t).await?;
        let payload = reply.require(2 + MAX_MESSAGE)?;
        let size = usize::from(payload[1]);
        if size > payload.len() - 2 {
            return Err(NxtError::InvalidReply(format!(
                "mailbox message reports {size} bytes"
            )));
        }
        Ok(codec::parse_name(&payload[2..2 + size]))
    }

    // --- flash filesystem ------------------------------------------------

    /// Open a file for reading; returns the handle and the file size.
    pub async fn open_read(&mut self, name: &str) -> Result<(u8, u32), NxtError> {
        codec::validate_name(name, MAX_FILE_NAME)?;
        let mut t = Telegram::system(SystemOpcode::OpenRead, true);
        t.put_name(name, FILE_NAME_FIELD);
        let reply = self.exchange(t).await?;
        let mut p = reply.require(5)?;
        Ok((p.get_u8(), p.get_u32_le()))
    }

    /// Create a file of fixed size and open it for writing.
    pub async fn open_write(&mut self, name: &str, size: u32) -> Result<u8, NxtError> {
        self.open_for_write(SystemOpcode::OpenWrite, name, size).await
    }

    /// Like `open_write`, but the file occupies one contiguous flash region.
    pub async fn open_write_linear(&mut self, name: &str, size: u32) -> Result<u8, NxtError> {
        self.open_for_write(SystemOpcode::OpenWriteLinear, name, size).await
    }

    /// Create a data file whose size grows as it is written.
    pub async fn open_write_data(&mut self, name: &str, size: u32) -> Result<u8, NxtError> {
        self.open_for_write(SystemOpcode::OpenWriteData, name, size).await
    }

    async fn open_for_write(
        &mut self,
        opcode: SystemOpcode,
        name: &str,
        size: u32,
    ) -> Result<u8, NxtError> {
        codec::validate_name(name, MAX_FILE_NAME)?;
        let mut t = Telegram::system(opcode, true);
        t.put_name(name, FILE_NAME_FIELD);
        t.put_u32(size);
        let reply = self.exchange(t).await?;
        Ok(reply.require(1)?[0])
    }

    /// Open an existing data file for appending; returns the handle and the
    /// remaining writable size.
    pub async fn open_append_data(&mut self, name: &str) -> Result<(u8, u32), NxtError> {
        codec::validate_name(name, MAX_FILE_NAME)?;
        let mut t = Telegram::system(SystemOpcode::OpenAppendData, true);
        t.put_name(name, FILE_NAME_FIELD);
        let reply = self.exchange(t).await?;
        let mut p = reply.require(5)?;
        Ok((p.get_u8(), p.get_u32_le()))
    }

    /// Read up to `length` bytes from an open handle.
    pub async fn read(&mut self, handle: u8, length: u16) -> Result<Bytes, NxtError> {
        let mut t = Telegram::system(SystemOpcode::Read, true);
        t.put_u8(handle);
        t.put_u16(length);
        let reply = self.exchange(t).await?;
        let payload = reply.require(3)?;
        let mut p = payload;
        let echoed = p.get_u8();
        if echoed != handle {
            return Err(NxtError::HandleEchoMismatch {
                requested: handle,
                answered: echoed,
            });
        }
        let n = usize::from(p.get_u16_le());
        if n > p.remaining() {
            return Err(NxtError::InvalidReply(format!(
                "file read reports {n} bytes but carries {}",
                p.remaining()
            )));
        }
        Ok(Bytes::copy_from_slice(&p[..n]))
    }

    /// Write bytes to an open handle; returns how many the brick accepted.
    pub async fn write(&mut self, handle: u8, data: &[u8]) -> Result<u16, NxtError> {
        let mut t = Telegram::system(SystemOpcode::Write, true);
        t.put_u8(handle);
        t.put_bytes(data);
        let reply = self.exchange(t).await?;
        let mut p = reply.require(3)?;
        let echoed = p.get_u8();
        if echoed != handle {
            return Err(NxtError::HandleEchoMismatch {
                requested: handle,
                answered: echoed,
            });
        }
        Ok(p.get_u16_le())
    }

    /// Close an open file handle.
    pub async fn close(&mut self, handle: u8) -> Result<(), NxtError> {
        let mut t = Telegram::system(SystemOpcode::Close, true);
        t.put_u8(handle);
        let reply = self.exchange(t).await?;
        let echoed = reply.require(1)?[0];
        if echoed != handle {
            return Err(NxtError::HandleEchoMismatch {
                requested: handle,
                answered: echoed,
            });
        }
        Ok(())
    }

    /// Delete a file from the brick's flash.
    pub async fn delete(&mut self, name: &str) -> Result<(), NxtError> {
        codec::validate_name(name, MAX_FILE_NAME)?;
        let mut t = Telegram::system(SystemOpcode::Delete, true);
        t.put_name(name, FILE_NAME_FIELD);
        self.exchange(t).await?;
        Ok(())
    }

    /// Begin a filesystem listing. Patterns like `*.rxe` are understood by
    /// the firmware. `None` when nothing matches.
    pub async fn find_first(&mut self, pattern: &str) -> Result<Option<FileInfo>, NxtError> {
        codec::validate_name(pattern, MAX_FILE_NAME)?;
        let mut t = Telegram::system(SystemOpcode::FindFirst, true);
        t.put_name(pattern, FILE_NAME_FIELD);
        let reply = self.exchange_lenient(t).await?;
        self.parse_find_reply(reply)
    }

    /// Continue a filesystem listing. `None` when the listing is exhausted.
    pub async fn find_next(&mut self, handle: u8) -> Result<Option<FileInfo>, NxtError> {
        let mut t = Telegram::system(SystemOpcode::FindNext, true);
        t.put_u8(handle);
        let reply = self.exchange_lenient(t).await?;
        self.parse_find_reply(reply)
    }

    fn parse_find_reply(&self, reply: Reply) -> Result<Option<FileInfo>, NxtError> {
        match reply.status() {
            StatusCode::Success => {
                let raw: &FileInfoRaw = parse_payload(&reply, "file-listing")?;
                Ok(Some(FileInfo::from(raw)))
            }
            StatusCode::FileNotFound => Ok(None),
            status => Err(NxtError::CommandFailed {
                opcode: reply.opcode(),
                status,
            }),
        }
    }

    // --- firmware modules and IO maps ------------------------------------

    /// Begin a module listing. `None` when no module matches the pattern.
    pub async fn request_first_module(
        &mut self,
        pattern: &str,
    ) -> Result<Option<ModuleInfo>, NxtError> {
        codec::validate_name(pattern, MAX_FILE_NAME)?;
        let mut t = Telegram::system(SystemOpcode::RequestFirstModule, true);
        t.put_name(pattern, FILE_NAME_FIELD);
        let reply = self.exchange_lenient(t).await?;
        self.parse_module_reply(reply)
    }

    /// Continue a module listing. `None` when the listing is exhausted.
    pub async fn request_next_module(
        &mut self,
        handle: u8,
    ) -> Result<Option<ModuleInfo>, NxtError> {
        let mut t = Telegram::system(SystemOpcode::RequestNextModule, true);
        t.put_u8(handle);
        let reply = self.exchange_lenient(t).await?;
        self.parse_module_reply(reply)
    }

    fn parse_module_reply(&self, reply: Reply) -> Result<Option<ModuleInfo>, NxtError> {
        match reply.status() {
            StatusCode::Success => {
                let raw: &ModuleInfoRaw = parse_payload(&reply, "module-listing")?;
                Ok(Some(ModuleInfo::from(raw)))
            }
            StatusCode::ModuleNotFound | StatusCode::NoMoreHandles => Ok(None),
            status => Err(NxtError::CommandFailed {
                opcode: reply.opcode(),
                status,
            }),
        }
    }

    /// Close a module listing handle.
    pub async fn close_module_handle(&mut self, handle: u8) -> Result<(), NxtError> {
        let mut t = Telegram::system(SystemOpcode::CloseModuleHandle, true);
        t.put_u8(handle);
        let reply = self.exchange(t).await?;
        let echoed = reply.require(1)?[0];
        if echoed != handle {
            return Err(NxtError::HandleEchoMismatch {
                requested: handle,
                answered: echoed,
            });
        }
        Ok(())
    }

    /// Read from a module's IO map.
    pub async fn read_io_map(
        &mut self,
        module: ModuleId,
        offset: u16,
        length: u16,
    ) -> Result<Bytes, NxtError> {
        let mut t = Telegram::system(SystemOpcode::ReadIoMap, true);
        t.put_u32(module.0);
        t.put_u16(offset);
        t.put_u16(length);
        let reply = self.exchange(t).await?;
        let mut p = reply.require(6)?;
        let echoed = p.get_u32_le();
        if echoed != module.0 {
            return Err(NxtError::ModuleEchoMismatch {
                requested: module.0,
                answered: echoed,
            });
        }
        let n = usize::from(p.get_u16_le());
        if n > p.remaining() {
            return Err(NxtError::InvalidReply(format!(
                "IO-map read reports {n} bytes but carries {}",
                p.remaining()
            )));
        }
        Ok(Bytes::copy_from_slice(&p[..n]))
    }

    /// Write into a module's IO map; returns how many bytes the brick took.
    pub async fn write_io_map(
        &mut self,
        module: ModuleId,
        offset: u16,
        data: &[u8],
    ) -> Result<u16, NxtError> {
        let mut t = Telegram::system(SystemOpcode::WriteIoMap, true);
        t.put_u32(module.0);
        t.put_u16(offset);
        t.put_u16(data.len() as u16);
        t.put_bytes(data);
        let reply = self.exchange(t).await?;
        let mut p = reply.require(6)?;
        let echoed = p.get_u32_le();
        if echoed != module.0 {
            return Err(NxtError::ModuleEchoMismatch {
                requested: module.0,
                answered: echoed,
            });
        }
        Ok(p.get_u16_le())
    }
}
