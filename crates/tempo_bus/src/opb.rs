//! On-chip Peripheral Bus master.
//!
//! Only single-beat reads and writes with all byte lanes enabled are
//! supported.

use tempo_sim::{Bus, Clock, SignalExt, SignalHost, SignalRef};

use crate::driver::{BusLock, Driver, IdleOnDrop};
use crate::error::{ConfigurationError, DriverError};

/// Signals every OPB master port must have.
pub const OPB_SIGNALS: &[&str] = &[
    "xferAck", "errAck", "toutSup", "retry", "DBus_out", "select", "RNW", "BE", "ABus", "DBus_in",
];

/// Signals an OPB master port may have.
pub const OPB_OPTIONAL_SIGNALS: &[&str] = &["seqAddr"];

/// Edges a transfer may wait for `xferAck` while `toutSup` is low.
pub const MAX_CYCLES: u32 = 16;

/// One OPB operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpbAccess {
    /// Read the word at an address.
    Read {
        /// Target address.
        address: u64,
    },
    /// Write a word to an address.
    Write {
        /// Target address.
        address: u64,
        /// Data to write.
        value: u64,
    },
}

/// Issues reads and writes on an OPB master port.
pub struct OpbMaster {
    name: String,
    clock: Clock,
    lock: BusLock,
    xfer_ack: SignalRef,
    tout_sup: SignalRef,
    select: SignalRef,
    rnw: SignalRef,
    byte_enable: SignalRef,
    address: SignalRef,
    data_out: SignalRef,
    data_in: SignalRef,
}

impl OpbMaster {
    /// Binds the OPB port `name` on `host` and deselects the bus.
    pub fn new(host: &dyn SignalHost, name: &str, clock: &Clock) -> Result<Self, ConfigurationError> {
        let bus = Bus::bind(host, name, OPB_SIGNALS, OPB_OPTIONAL_SIGNALS)?;
        let select = bus.signal("select")?;
        select.set_bool(false)?;
        log::debug!("{name}: OPB master created");
        Ok(Self {
            name: name.to_string(),
            clock: clock.clone(),
            lock: BusLock::new(),
            xfer_ack: bus.signal("xferAck")?,
            tout_sup: bus.signal("toutSup")?,
            select,
            rnw: bus.signal("RNW")?,
            byte_enable: bus.signal("BE")?,
            address: bus.signal("ABus")?,
            data_out: bus.signal("DBus_out")?,
            data_in: bus.signal("DBus_in")?,
        })
    }

    /// Reads the word at `address`.
    pub async fn read(&self, address: u64, sync: bool) -> Result<u64, DriverError> {
        let _bus = self.lock.acquire().await;
        let idle = IdleOnDrop::new(vec![self.select.clone()]);
        if sync {
            self.clock.rising_edge().await?;
        }
        self.request(address, true)?;
        self.wait_for_ack().await?;

        let sampled = self.data_in.value();
        let data = sampled.to_u64().ok_or_else(|| DriverError::UnresolvableRead {
            bus: self.name.clone(),
            address,
            value: sampled.to_string(),
        })?;
        self.select.set_bool(false)?;
        idle.disarm();
        log::info!("{}: read of address {address:#x} returned {data:#010x}", self.name);
        Ok(data)
    }

    /// Writes `value` to `address`.
    pub async fn write(&self, address: u64, value: u64, sync: bool) -> Result<(), DriverError> {
        let _bus = self.lock.acquire().await;
        let idle = IdleOnDrop::new(vec![self.select.clone()]);
        if sync {
            self.clock.rising_edge().await?;
        }
        self.request(address, false)?;
        self.data_out.set_u64(value)?;
        self.wait_for_ack().await?;

        self.select.set_bool(false)?;
        idle.disarm();
        log::debug!("{}: wrote {value:#010x} to address {address:#x}", self.name);
        Ok(())
    }

    fn request(&self, address: u64, read: bool) -> Result<(), DriverError> {
        self.address.set_u64(address)?;
        self.select.set_bool(true)?;
        self.rnw.set_bool(read)?;
        self.byte_enable.set_u64(0xF)?;
        Ok(())
    }

    /// Waits for `xferAck`. The count of unacknowledged edges restarts
    /// whenever the slave holds `toutSup`.
    async fn wait_for_ack(&self) -> Result<(), DriverError> {
        let mut count = 0;
        loop {
            self.clock.rising_edge().await?;
            self.clock.read_only().await?;
            if self.xfer_ack.is_high() {
                return Ok(());
            }
            if self.tout_sup.is_high() {
                count = 0;
            } else {
                count += 1;
            }
            if count >= MAX_CYCLES {
                return Err(DriverError::BusTimeout {
                    bus: self.name.clone(),
                    cycles: MAX_CYCLES,
                });
            }
        }
    }
}

impl Driver for OpbMaster {
    type Transaction = OpbAccess;
    /// The data returned by a read; `None` for a write.
    type Response = Option<u64>;

    async fn send(&self, transaction: OpbAccess, sync: bool) -> Result<Option<u64>, DriverError> {
        match transaction {
            OpbAccess::Read { address } => self.read(address, sync).await.map(Some),
            OpbAccess::Write { address, value } => {
                self.write(address, value, sync).await.map(|()| None)
            }
        }
    }
}
