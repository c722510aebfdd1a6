// iio-source/src/stream.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! The per-tick streaming cycle.
//!
//! Each time the scheduler runs the source, one cycle:
//!
//! 1. Checks that every output port has room for a full buffer of
//!    samples, both by the scheduler's count and by the ports' own free
//!    space. If not, it returns without touching the hardware.
//! 2. Waits for the buffer to become readable, for no longer than the
//!    tick's timeout. On a timeout it yields back to the scheduler.
//! 3. Refills the buffer.
//! 4. Demultiplexes the same number of samples from the refill into the
//!    port of every scan channel. If any channel comes up short, the
//!    whole refill is withdrawn from the ports.
//!
//! The wait is the only place a tick can block, and it is bounded by the
//! scheduler's deadline.

use std::{os::unix::io::RawFd, time::Duration};

use log::{trace, warn};
use nix::{
    errno::Errno,
    poll::{ppoll, PollFd, PollFlags},
    sys::time::TimeSpec,
};

use crate::{
    buffer_manager::BufferManager,
    channel_set::ChannelSet,
    hardware::{Buffer, Channel},
    port::WorkInfo,
    Error, Result,
};

/// The outcome of waiting for a buffer to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Data is ready to be read.
    Ready,
    /// The timeout expired with no data.
    TimedOut,
    /// The wait itself failed.
    Failed(Errno),
}

/// Waits up to `timeout` for the descriptor to become readable.
///
/// An interrupted wait counts as a timeout, so the scheduler simply runs
/// the tick again.
pub fn wait_ready(fd: RawFd, timeout: Duration) -> Readiness {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];

    match ppoll(&mut fds, Some(TimeSpec::from(timeout)), None) {
        Ok(0) | Err(Errno::EINTR) => Readiness::TimedOut,
        Ok(_) => {
            let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
            if revents.contains(PollFlags::POLLNVAL) {
                Readiness::Failed(Errno::EBADF)
            }
            else {
                Readiness::Ready
            }
        }
        Err(err) => Readiness::Failed(err),
    }
}

/// What a work tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// The source isn't streaming; nothing was done.
    Idle,
    /// The ports didn't have room for a full refill; the hardware wasn't
    /// touched.
    Backpressured,
    /// No data arrived before the deadline; control went back to the
    /// scheduler.
    Yielded,
    /// A refill produced this many samples on every scan port.
    Produced(usize),
}

/// Runs one streaming cycle.
///
/// Returns [`WorkStatus::Idle`] right away if the manager holds no buffer.
pub fn run_cycle<C: Channel>(
    mgr: &mut BufferManager<C::Buffer>,
    channels: &mut ChannelSet<C>,
    info: &WorkInfo,
) -> Result<WorkStatus> {
    let buf = match mgr.buffer_mut() {
        Some(buf) => buf,
        None => return Ok(WorkStatus::Idle),
    };

    // A refill always fills the whole buffer, and it can't be delivered
    // in pieces.
    let room = channels
        .ports()
        .iter()
        .map(|p| p.free())
        .min()
        .map_or(info.min_out_elements, |free| free.min(info.min_out_elements));
    if room < buf.capacity() {
        trace!("Backpressure: {} < {}", room, buf.capacity());
        return Ok(WorkStatus::Backpressured);
    }

    let fd = buf.poll_fd().map_err(|err| match err {
        Error::Nix(errno) => Error::Io(errno),
        err => err,
    })?;

    match wait_ready(fd, info.max_timeout) {
        Readiness::Ready => {}
        Readiness::TimedOut => return Ok(WorkStatus::Yielded),
        Readiness::Failed(err) => return Err(Error::Io(err)),
    }

    let nbytes = match buf.refill() {
        Ok(n) => n,
        Err(Error::Nix(Errno::EAGAIN)) => return Ok(WorkStatus::Yielded),
        Err(err) => return Err(err),
    };

    // The library never returns a partial scan.
    let step = buf.step();
    if step == 0 || nbytes % step != 0 {
        return Err(Error::PartialScan {
            bytes: nbytes,
            step,
        });
    }
    let count = nbytes / step;
    trace!("Refill: {} bytes, {} samples", nbytes, count);

    let buf = &*buf;
    let mut produced = Vec::new();
    let mut short = None;
    for (chan, port) in channels.scan_outputs_mut() {
        let n = port.produce_with(count, |dst| chan.read(buf, dst));
        produced.push(n);
        if n != count {
            short = Some((chan.id(), n));
            break;
        }
    }

    if let Some((channel, samples)) = short {
        warn!(
            "Channel '{}' produced {} of {} samples; withdrawing refill",
            channel, samples, count
        );
        for (port, n) in channels.ports_mut().iter_mut().zip(produced) {
            port.retract(n);
        }
        return Err(Error::ShortRead {
            channel,
            samples,
            expected: count,
        });
    }

    Ok(WorkStatus::Produced(count))
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        projection::ControlTable,
        sim::{SimBuffer, SimChannel, SimDevice},
        DataFormat, Device,
    };
    use nix::{fcntl::OFlag, unistd};
    use std::time::Instant;

    const CAP: usize = 8;

    struct Rig {
        dev: SimDevice,
        mgr: BufferManager<SimBuffer>,
        set: ChannelSet<SimChannel>,
    }

    fn rig() -> Rig {
        let dev = SimDevice::new("dev0")
            .with_channel(SimChannel::new("ch0", DataFormat::integer(16, false)))
            .with_channel(SimChannel::new("temp", DataFormat::integer(16, true)).attribute_only())
            .with_channel(SimChannel::new("ch1", DataFormat::integer(32, false)));
        let mut tbl = ControlTable::new();
        let set = ChannelSet::build(&dev, &[], true, 4 * CAP, &mut tbl);
        let mut mgr = BufferManager::<SimBuffer>::new();
        mgr.allocate(&dev, set.channels(), CAP, true).unwrap();
        Rig { dev, mgr, set }
    }

    fn info(min_out: usize) -> WorkInfo {
        WorkInfo::new(Duration::from_millis(10), min_out)
    }

    #[test]
    fn wait_on_pipe() {
        let (rd, wr) = unistd::pipe2(OFlag::O_NONBLOCK).unwrap();
        assert_eq!(wait_ready(rd, Duration::ZERO), Readiness::TimedOut);

        unistd::write(wr, &[1]).unwrap();
        assert_eq!(wait_ready(rd, Duration::from_secs(1)), Readiness::Ready);

        unistd::close(rd).unwrap();
        unistd::close(wr).unwrap();
    }

    #[test]
    fn wait_on_bad_fd_fails() {
        // Far above anything the test process has open
        const BAD_FD: RawFd = 999_999;
        assert_eq!(wait_ready(BAD_FD, Duration::ZERO), Readiness::Failed(Errno::EBADF));
    }

    #[test]
    fn wait_respects_deadline() {
        let (rd, wr) = unistd::pipe().unwrap();
        let start = Instant::now();
        assert_eq!(wait_ready(rd, Duration::from_millis(20)), Readiness::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(15));
        assert!(elapsed < Duration::from_secs(2));
        unistd::close(rd).unwrap();
        unistd::close(wr).unwrap();
    }

    #[test]
    fn idle_without_buffer() {
        let mut r = rig();
        let chans = r.set.channels().to_vec();
        r.mgr.release(&chans);
        assert_eq!(run_cycle(&mut r.mgr, &mut r.set, &info(1000)).unwrap(), WorkStatus::Idle);
    }

    #[test]
    fn backpressure_skips_hardware() {
        let mut r = rig();
        r.dev.signal_ready().unwrap();
        let before = r.dev.stats();

        let st = run_cycle(&mut r.mgr, &mut r.set, &info(CAP - 1)).unwrap();
        assert_eq!(st, WorkStatus::Backpressured);
        assert_eq!(r.dev.stats(), before);
    }

    #[test]
    fn timeout_yields_then_retries() {
        let mut r = rig();

        let st = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap();
        assert_eq!(st, WorkStatus::Yielded);
        assert_eq!(r.dev.stats().refills, 0);
        assert!(r.set.ports().iter().all(|p| p.elements() == 0));

        r.dev.signal_ready().unwrap();
        let st = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap();
        assert_eq!(st, WorkStatus::Produced(CAP));
    }

    #[test]
    fn synchronized_demux() {
        let mut r = rig();
        r.dev.signal_ready().unwrap();

        let st = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap();
        assert_eq!(st, WorkStatus::Produced(CAP));

        let ch0: Vec<u16> = r
            .set
            .port("ch0")
            .unwrap()
            .as_bytes()
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(ch0, (0..CAP as u16).collect::<Vec<_>>());

        // ch1 is third on the device, so its samples are n * 3
        let ch1: Vec<u32> = r
            .set
            .port("ch1")
            .unwrap()
            .as_bytes()
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(ch1, (0..CAP as u32).map(|n| 3 * n).collect::<Vec<_>>());
    }

    #[test]
    fn undrained_ports_backpressure() {
        let mut r = rig();
        let cap = r.set.port("ch0").unwrap().capacity();
        assert_eq!(cap, 4 * CAP);

        let mut produced = 0;
        for _ in 0..6 {
            r.dev.signal_ready().unwrap();
            // The scheduler claims plenty of room, but nothing is drained
            match run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap() {
                WorkStatus::Produced(n) => produced += n,
                st => assert_eq!(st, WorkStatus::Backpressured),
            }
            for port in r.set.ports() {
                assert!(port.elements() <= port.capacity());
            }
        }
        assert_eq!(produced, cap);
        assert_eq!(r.dev.stats().refills, 4);

        r.set.port_mut("ch0").unwrap().take();
        r.set.port_mut("ch1").unwrap().take();
        assert_eq!(
            run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap(),
            WorkStatus::Produced(CAP)
        );
    }

    #[test]
    fn poll_fd_failure_is_io_error() {
        let mut r = rig();
        r.dev.fail_poll_fd(Some(Errno::ENODEV));
        let err = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap_err();
        assert!(matches!(err, Error::Io(Errno::ENODEV)));
    }

    #[test]
    fn failed_wait_is_io_error() {
        let mut r = rig();
        r.dev.stale_poll_fd(true);
        let err = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap_err();
        assert!(matches!(err, Error::Io(Errno::EBADF)));
        assert_eq!(r.dev.stats().refills, 0);
    }

    #[test]
    fn empty_refill_yields() {
        let mut r = rig();
        r.dev.signal_ready().unwrap();
        r.dev.fail_next_refill(Errno::EAGAIN);

        let st = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap();
        assert_eq!(st, WorkStatus::Yielded);
        assert_eq!(r.dev.stats().refills, 1);
        assert!(r.set.ports().iter().all(|p| p.elements() == 0));
    }

    #[test]
    fn short_channel_read_withdraws_refill() {
        let mut r = rig();
        r.dev.find_channel("ch1").unwrap().limit_reads(Some(2));
        r.dev.signal_ready().unwrap();

        let err = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap_err();
        assert!(err.is_contract_breach());
        assert!(matches!(
            err,
            Error::ShortRead { ref channel, samples: 2, expected: CAP } if channel == "ch1"
        ));
        for port in r.set.ports() {
            assert_eq!(port.elements(), 0);
            assert_eq!(port.total_produced(), 0);
        }
    }

    #[test]
    fn zero_sample_refill() {
        let mut r = rig();
        r.dev.force_refill_bytes(0);
        r.dev.signal_ready().unwrap();

        let st = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap();
        assert_eq!(st, WorkStatus::Produced(0));
        assert!(r.set.ports().iter().all(|p| p.elements() == 0));
    }

    #[test]
    fn partial_scan_is_breach() {
        let mut r = rig();
        // step is 6 bytes (u16 + u32)
        r.dev.force_refill_bytes(6 * 3 + 1);
        r.dev.signal_ready().unwrap();

        let err = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap_err();
        assert!(matches!(err, Error::PartialScan { bytes: 19, step: 6 }));
        assert!(r.set.ports().iter().all(|p| p.elements() == 0));
    }

    #[test]
    fn short_refill_is_synchronized() {
        let mut r = rig();
        r.dev.force_refill_bytes(6 * 3);
        r.dev.signal_ready().unwrap();

        let st = run_cycle(&mut r.mgr, &mut r.set, &info(CAP)).unwrap();
        assert_eq!(st, WorkStatus::Produced(3));
        assert_eq!(r.set.port("ch0").unwrap().elements(), 3);
        assert_eq!(r.set.port("ch1").unwrap().elements(), 3);
        assert_eq!(r.dev.channels().len(), 3);
    }
}
