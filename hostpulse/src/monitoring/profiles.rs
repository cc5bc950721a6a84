use super::ProcessFields;

impl ProcessFields {
    pub fn all() -> Self {
        Self {
            user: true,
            io: true,
            network: true,
            connections: true,
            start_time: true,
            cwd: true,
            cmdline: true,
        }
    }

    /// Enough for a top-style table: owner and disk activity only.
    pub fn minimal() -> Self {
        Self {
            user: true,
            io: true,
            network: false,
            connections: false,
            start_time: false,
            cwd: false,
            cmdline: false,
        }
    }

    pub fn none() -> Self {
        Self {
            user: false,
            io: false,
            network: false,
            connections: false,
            start_time: false,
            cwd: false,
            cmdline: false,
        }
    }
}

impl Default for ProcessFields {
    fn default() -> Self {
        Self::all()
    }
}
