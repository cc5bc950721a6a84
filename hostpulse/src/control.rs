use crate::error::ControlError;
use std::ops::RangeInclusive;
use tracing::info;

pub const PRIORITY_RANGE: RangeInclusive<i32> = -20..=19;

/// Sends SIGTERM to `pid`.
pub fn terminate(pid: u32) -> Result<(), ControlError> {
    imp::terminate(pid)?;
    info!("Sent termination signal to process {}", pid);
    Ok(())
}

/// Sets the scheduling niceness of `pid`. Lower is higher priority.
pub fn set_priority(pid: u32, level: i32) -> Result<(), ControlError> {
    if !PRIORITY_RANGE.contains(&level) {
        return Err(ControlError::InvalidPriority(level));
    }
    imp::set_priority(pid, level)?;
    info!("Set priority of process {} to {}", pid, level);
    Ok(())
}

#[cfg(unix)]
mod imp {
    use crate::error::ControlError;
    use std::io;

    fn checked_pid(pid: u32) -> Result<libc::pid_t, ControlError> {
        // 0 and negative pids address process groups.
        match libc::pid_t::try_from(pid) {
            Ok(p) if p > 0 => Ok(p),
            _ => Err(ControlError::NoSuchProcess(pid)),
        }
    }

    fn map_errno(pid: u32, err: io::Error) -> ControlError {
        match err.raw_os_error() {
            Some(libc::ESRCH) => ControlError::NoSuchProcess(pid),
            Some(libc::EPERM) | Some(libc::EACCES) => ControlError::AccessDenied(pid),
            Some(errno) => ControlError::Os { pid, errno },
            None => ControlError::Os { pid, errno: 0 },
        }
    }

    pub fn terminate(pid: u32) -> Result<(), ControlError> {
        let target = checked_pid(pid)?;
        let ret = unsafe { libc::kill(target, libc::SIGTERM) };
        if ret == 0 {
            Ok(())
        } else {
            Err(map_errno(pid, io::Error::last_os_error()))
        }
    }

    pub fn set_priority(pid: u32, level: i32) -> Result<(), ControlError> {
        let target = checked_pid(pid)?;
        let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, target as libc::id_t, level) };
        if ret == 0 {
            Ok(())
        } else {
            Err(map_errno(pid, io::Error::last_os_error()))
        }
    }

    #[cfg(test)]
    pub fn errno_to_error(pid: u32, errno: i32) -> ControlError {
        map_errno(pid, io::Error::from_raw_os_error(errno))
    }
}

#[cfg(not(unix))]
mod imp {
    use crate::error::ControlError;

    pub fn terminate(_pid: u32) -> Result<(), ControlError> {
        Err(ControlError::Unsupported)
    }

    pub fn set_priority(_pid: u32, _level: i32) -> Result<(), ControlError> {
        Err(ControlError::Unsupported)
    }
}
