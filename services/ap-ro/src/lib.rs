use core::sync::atomic::{AtomicU32, Ordering};

pub use ap_ro_verify::commands::{CommandSource, Response};
pub use ap_ro_verify::{ApRoStatus, VendorRc};
use ap_ro_verify::{APRO_MAX_NUM_RANGES, RO_RANGE_SIZE, SHA256_DIGEST_SIZE};
use num_traits::*;
use xous::{send_message, Message, CID};
use xous_ipc::Buffer;

pub const SERVER_NAME_APRO: &str = "_AP RO verifier_";

/// Largest payload of any vendor command: a seed with every range in use.
pub const MAX_COMMAND_DATA: usize = SHA256_DIGEST_SIZE + RO_RANGE_SIZE * APRO_MAX_NUM_RANGES;

#[derive(Debug, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum Opcode {
    /// Programs or erases the factory record. Memory message, [`CommandBuffer`].
    Seed,
    /// Runs verification now. Memory message, [`CommandBuffer`].
    Validate,
    /// Memory message, [`CommandBuffer`].
    GetHash,
    /// Memory message, [`CommandBuffer`].
    GetStatus,
    /// The `ap_ro_info` console command. Memory message, [`ConsoleBuffer`].
    Info,
    /// The AP power domain was reset. Blocking scalar.
    DeviceReset,
    /// Blocking scalar returning the latched status byte without any checks.
    Status,
    InvalidCall,
}

/// A vendor command and, on return, its response.
#[derive(Debug, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct CommandBuffer {
    pub data: [u8; MAX_COMMAND_DATA],
    pub len: u32,
    /// 0 for the host, 1 for the alternate trusted interface.
    pub source: u8,
    pub rc: u8,
}

impl CommandBuffer {
    pub fn new(input: &[u8], source: CommandSource) -> Result<Self, xous::Error> {
        if input.len() > MAX_COMMAND_DATA {
            return Err(xous::Error::OutOfMemory);
        }
        let mut buf = CommandBuffer {
            data: [0u8; MAX_COMMAND_DATA],
            len: input.len() as u32,
            source: if source == CommandSource::AltInterface { 1 } else { 0 },
            rc: VendorRc::InternalError as u8,
        };
        buf.data[..input.len()].copy_from_slice(input);
        Ok(buf)
    }

    pub fn input(&self) -> &[u8] { &self.data[..(self.len as usize).min(MAX_COMMAND_DATA)] }

    pub fn source(&self) -> CommandSource {
        if self.source == 1 { CommandSource::AltInterface } else { CommandSource::Host }
    }

    pub fn set_response(&mut self, rsp: &Response) {
        let len = rsp.data.len().min(MAX_COMMAND_DATA);
        self.data[..len].copy_from_slice(&rsp.data[..len]);
        self.len = len as u32;
        self.rc = rsp.rc as u8;
    }

    pub fn response(&self) -> Response {
        Response {
            rc: VendorRc::from_u8(self.rc).unwrap_or(VendorRc::InternalError),
            data: self.input().to_vec(),
        }
    }
}

#[derive(Debug, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct ConsoleBuffer {
    pub args: String,
    pub output: String,
    pub ok: bool,
}

pub struct ApRo {
    conn: CID,
}

impl ApRo {
    pub fn new(xns: &xous_names::XousNames) -> Result<Self, xous::Error> {
        REFCOUNT.fetch_add(1, Ordering::Relaxed);
        let conn = xns.request_connection_blocking(SERVER_NAME_APRO).expect("Can't connect to AP RO server");
        Ok(ApRo { conn })
    }

    fn command(&self, op: Opcode, input: &[u8], source: CommandSource) -> Result<Response, xous::Error> {
        let mut buf = Buffer::into_buf(CommandBuffer::new(input, source)?).or(Err(xous::Error::InternalError))?;
        buf.lend_mut(self.conn, op.to_u32().unwrap()).or(Err(xous::Error::InternalError))?;
        let ret = buf.to_original::<CommandBuffer, _>().or(Err(xous::Error::InternalError))?;
        Ok(ret.response())
    }

    /// `digest || ranges`, or nothing to erase the record.
    pub fn seed(&self, payload: &[u8]) -> Result<Response, xous::Error> {
        self.command(Opcode::Seed, payload, CommandSource::Host)
    }

    pub fn validate(&self, source: CommandSource) -> Result<Response, xous::Error> {
        self.command(Opcode::Validate, &[], source)
    }

    pub fn get_hash(&self) -> Result<Response, xous::Error> { self.command(Opcode::GetHash, &[], CommandSource::Host) }

    pub fn get_status(&self) -> Result<Response, xous::Error> {
        self.command(Opcode::GetStatus, &[], CommandSource::Host)
    }

    /// Runs `ap_ro_info` with `args` and returns what it printed. Errors are
    /// appended to the text.
    pub fn info(&self, args: &str) -> Result<String, xous::Error> {
        let req = ConsoleBuffer { args: args.to_owned(), output: String::new(), ok: false };
        let mut buf = Buffer::into_buf(req).or(Err(xous::Error::InternalError))?;
        buf.lend_mut(self.conn, Opcode::Info.to_u32().unwrap()).or(Err(xous::Error::InternalError))?;
        let ret = buf.to_original::<ConsoleBuffer, _>().or(Err(xous::Error::InternalError))?;
        Ok(ret.output)
    }

    pub fn device_reset(&self) -> Result<(), xous::Error> {
        send_message(self.conn, Message::new_blocking_scalar(Opcode::DeviceReset.to_usize().unwrap(), 0, 0, 0, 0))
            .map(|_| ())
    }

    pub fn status(&self) -> Result<ApRoStatus, xous::Error> {
        match send_message(self.conn, Message::new_blocking_scalar(Opcode::Status.to_usize().unwrap(), 0, 0, 0, 0))
        {
            Ok(xous::Result::Scalar1(code)) => ApRoStatus::from_usize(code).ok_or(xous::Error::InternalError),
            _ => Err(xous::Error::InternalError),
        }
    }
}

static REFCOUNT: AtomicU32 = AtomicU32::new(0);
impl Drop for ApRo {
    fn drop(&mut self) {
        if REFCOUNT.fetch_sub(1, Ordering::Relaxed) == 1 {
            unsafe {
                xous::disconnect(self.conn).unwrap();
            }
        }
    }
}
