mod platform;

use ap_ro::*;
use ap_ro_verify::enforce::ResetHold;
use ap_ro_verify::{ApRoVerifier, VerifierConfig};
use num_traits::FromPrimitive;
use xous::msg_blocking_scalar_unpack;
use xous_ipc::Buffer;

fn main() -> ! {
    log_server::init_wait().unwrap();
    log::set_max_level(log::LevelFilter::Info);
    log::info!("my PID is {}", xous::process::id());

    let xns = xous_names::XousNames::new().unwrap();
    let sid = xns.register_name(SERVER_NAME_APRO, None).expect("can't register server");

    let platform = platform::EmuPlatform::new();
    let hold_line = platform.reset_line();
    let mut verifier = ApRoVerifier::new(platform, VerifierConfig::default());

    // re-asserts the AP reset for as long as a failure is latched
    let hold = ResetHold::new(verifier.status_handle(), hold_line);
    std::thread::spawn(move || {
        let tt = ticktimer::Ticktimer::new().unwrap();
        hold.run(|ms| {
            tt.sleep_ms(ms).ok();
        });
    });

    // the AP stays in reset until this first check completes
    let outcome = verifier.run_check();
    log::info!("boot check: {:?}, status {:?}", outcome, verifier.status());

    loop {
        let mut msg = xous::receive_message(sid).unwrap();
        let opcode: Option<Opcode> = FromPrimitive::from_usize(msg.body.id());
        log::debug!("{:?}", opcode);
        match opcode {
            Some(Opcode::Seed) | Some(Opcode::Validate) | Some(Opcode::GetHash) | Some(Opcode::GetStatus) => {
                let mut buffer =
                    unsafe { Buffer::from_memory_message_mut(msg.body.memory_message_mut().unwrap()) };
                let mut cmd = buffer.to_original::<CommandBuffer, _>().unwrap();
                let rsp = match opcode {
                    Some(Opcode::Seed) => verifier.seed(cmd.input()),
                    Some(Opcode::Validate) => verifier.validate(cmd.source()),
                    Some(Opcode::GetHash) => verifier.get_hash(cmd.input()),
                    _ => verifier.get_status(cmd.input()),
                };
                cmd.set_response(&rsp);
                buffer.replace(cmd).unwrap();
            }
            Some(Opcode::Info) => {
                let mut buffer =
                    unsafe { Buffer::from_memory_message_mut(msg.body.memory_message_mut().unwrap()) };
                let mut req = buffer.to_original::<ConsoleBuffer, _>().unwrap();
                let mut output = String::new();
                match verifier.ap_ro_info(&req.args, &mut output) {
                    Ok(()) => req.ok = true,
                    Err(e) => {
                        output.push_str(&format!("Error: {}\n", e));
                        req.ok = false;
                    }
                }
                req.output = output;
                buffer.replace(req).unwrap();
            }
            Some(Opcode::DeviceReset) => msg_blocking_scalar_unpack!(msg, _, _, _, _, {
                verifier.device_reset();
                xous::return_scalar(msg.sender, 0).unwrap();
            }),
            Some(Opcode::Status) => msg_blocking_scalar_unpack!(msg, _, _, _, _, {
                xous::return_scalar(msg.sender, verifier.status() as usize).unwrap();
            }),
            _ => log::warn!("unrecognized opcode"),
        }
    }
}
