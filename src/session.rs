//! A stateful connection to one heat pump.

use crate::codec::{self, RawWrite, Value};
use crate::connection::{Options, TcpTransport};
use crate::modbus::MAX_READ_COUNT;
use crate::planner::{self, GateState, Transaction};
use crate::registers::{self, Catalog, Descriptor, Model, RegionKind};
use crate::store::{Snapshot, ValueStore};
use crate::transport::{self, Transport};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const FIRMWARE_PARTS: [&str; 3] =
    ["input_software_version_major", "input_software_version_minor", "input_software_version_micro"];

/// How reads are paced and batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Most addresses a single read request may cover.
    pub max_registers: u16,
    /// Pause before every request sent to the device.
    pub delay: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self { max_registers: 16, delay: Duration::from_millis(100) }
    }
}

#[derive(clap::Parser, Clone)]
#[group(id = "session::Args")]
pub struct Args {
    /// The heat pump model, which decides the registers and address ranges available.
    #[arg(long, short = 'm', value_enum, default_value_t)]
    model: Model,

    /// Most registers to read with a single request.
    #[arg(
        long,
        default_value_t = Policy::default().max_registers,
        value_parser = clap::value_parser!(u16).range(1..=i64::from(MAX_READ_COUNT)),
    )]
    max_registers: u16,

    /// The amount of time to wait before sending each request.
    ///
    /// Interacting too fast can make some Modbus TCP interfaces behave poorly.
    #[arg(long, default_value = "100ms")]
    delay: humantime::Duration,
}

impl Args {
    pub fn model(&self) -> Model {
        self.model
    }

    pub fn policy(&self) -> Policy {
        Policy { max_registers: self.max_registers, delay: *self.delay }
    }
}

/// Which registers an [`Session::update`] reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Everything the model exposes.
    All,
    /// Everything the model exposes in these regions.
    Kinds(Vec<RegionKind>),
    /// Exactly these registers, or everything the model exposes if there are none.
    Names(Vec<String>),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] registers::Error),
    #[error("could not plan the reads")]
    Plan(#[from] planner::Error),
    #[error("could not encode the value for `{1}`")]
    Encode(#[source] codec::Error, &'static str),
    #[error("could not read {count} {kind}(s) starting at address {address}")]
    Read {
        #[source]
        source: transport::Error,
        kind: RegionKind,
        address: u16,
        count: u16,
    },
    #[error("could not write `{name}` at address {address}")]
    Write {
        #[source]
        source: transport::Error,
        name: &'static str,
        address: u16,
    },
    #[error("read of {count} {kind}(s) at address {address} returned only {got} values")]
    ShortResponse { kind: RegionKind, address: u16, count: u16, got: usize },
    #[error("could not decode `{1}`")]
    Decode(#[source] codec::Error, &'static str),
}

impl Error {
    /// The transport failure behind this error, if it is one.
    pub fn transport(&self) -> Option<&transport::Error> {
        match self {
            Error::Read { source, .. } | Error::Write { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn exception_code(&self) -> Option<u8> {
        self.transport().and_then(transport::Error::exception_code)
    }

    pub fn is_not_writable(&self) -> bool {
        matches!(self, Error::Encode(codec::Error::NotWritable(_), _))
    }
}

/// A derived value could not be computed because a register it is made of has not been read.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` has not been read yet")]
pub struct IncompleteData(pub &'static str);

pub struct Session<T> {
    transport: T,
    catalog: Catalog,
    model: Model,
    policy: Policy,
    store: ValueStore,
    firmware: Option<String>,
}

impl Session<TcpTransport> {
    /// A session talking Modbus TCP to `host:port` with the Genesis register map.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        model: Model,
        max_registers: u16,
        delay: Duration,
    ) -> Self {
        let transport = TcpTransport::new(Options::new(host, port));
        Self::with_transport(transport, Catalog::GENESIS, model, Policy { max_registers, delay })
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(transport: T, catalog: Catalog, model: Model, policy: Policy) -> Self {
        Self { transport, catalog, model, policy, store: ValueStore::new(), firmware: None }
    }

    pub fn host(&self) -> String {
        self.transport.peer()
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether any value has been read so far.
    pub fn available(&self) -> bool {
        !self.store.is_empty()
    }

    /// The `major.minor.micro` firmware version as of the last successful update.
    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    pub fn data(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Read the selected registers from the device and merge them into [`Self::data`].
    ///
    /// Values are merged after every request, so on failure whatever was read before the
    /// failing request is retained, and the firmware version is recomposed from it.
    pub async fn update(&mut self, selection: &Selection) -> Result<(), Error> {
        let result = self.read(selection).await;
        self.close().await;
        self.refresh_firmware();
        result?;
        debug!(message = "updated", host = %self.host(), values = ?self.store);
        Ok(())
    }

    /// Write a single register.
    ///
    /// Returns the value the device has accepted. [`Self::data`] is not modified until the
    /// register is read back.
    pub async fn set(&mut self, name: &str, value: Value) -> Result<Value, Error> {
        let register = self.catalog.lookup(name)?;
        let raw = codec::encode(register, value).map_err(|e| Error::Encode(e, register.name))?;
        let result = self.write(register, raw).await;
        self.close().await;
        result.map(|()| value)
    }

    fn select(&self, selection: &Selection) -> Result<Vec<&'static Descriptor>, Error> {
        Ok(match selection {
            Selection::All => self.catalog.all_applicable(self.model).collect(),
            Selection::Kinds(kinds) => self.catalog.of_kinds(self.model, kinds).collect(),
            Selection::Names(names) if names.is_empty() => {
                self.catalog.all_applicable(self.model).collect()
            }
            Selection::Names(names) => self.catalog.resolve(names.iter().map(String::as_str))?,
        })
    }

    async fn read(&mut self, selection: &Selection) -> Result<(), Error> {
        let candidates = self.select(selection)?;
        let ranges = self.catalog.valid_ranges(self.model);
        for d in &candidates {
            let last = d.last_address();
            if self.catalog.range_containing(self.model, d.kind, d.address, last).is_none() {
                return Err(planner::Error::OutsideValidRange {
                    name: d.name,
                    kind: d.kind,
                    address: d.address,
                }
                .into());
            }
        }

        let store = &self.store;
        let gate = |d: &Descriptor| GateState::evaluate(d.gate, |name| store.get(name));
        let max = self.policy.max_registers;
        let first = planner::plan(candidates.iter().copied(), ranges, max, gate)?;
        // Registers whose gate is being read right now get another chance once it has been.
        let retry = first
            .skipped
            .iter()
            .filter(|s| s.gate == GateState::Unknown)
            .filter(|s| {
                let gate = s.register.gate.map(|g| g.register);
                candidates.iter().any(|c| Some(c.name) == gate)
            })
            .map(|s| s.register)
            .collect::<Vec<_>>();
        for transaction in &first.transactions {
            self.execute(transaction).await?;
        }
        if retry.is_empty() {
            return Ok(());
        }

        debug!(message = "reading registers behind freshly read gates", count = retry.len());
        let store = &self.store;
        let gate = |d: &Descriptor| GateState::evaluate(d.gate, |name| store.get(name));
        let second = planner::plan(retry, ranges, max, gate)?;
        for transaction in &second.transactions {
            self.execute(transaction).await?;
        }
        Ok(())
    }

    async fn execute(&mut self, transaction: &Transaction<'_>) -> Result<(), Error> {
        tokio::time::sleep(self.policy.delay).await;
        let (kind, address, count) = (transaction.kind, transaction.start, transaction.count());
        debug!(message = "reading", %kind, address, count);
        let read_error =
            move |source: transport::Error| Error::Read { source, kind, address, count };
        self.transport.open().await.map_err(read_error)?;
        let words: Vec<u16> = match kind {
            RegionKind::Coil => {
                let bits = self.transport.read_coils(address, count).await.map_err(read_error)?;
                bits.into_iter().map(u16::from).collect()
            }
            RegionKind::DiscreteInput => {
                let bits = self.transport.read_discrete_inputs(address, count).await;
                bits.map_err(read_error)?.into_iter().map(u16::from).collect()
            }
            RegionKind::InputRegister => {
                self.transport.read_input_registers(address, count).await.map_err(read_error)?
            }
            RegionKind::HoldingRegister => {
                self.transport.read_holding_registers(address, count).await.map_err(read_error)?
            }
        };
        if words.len() < usize::from(count) {
            return Err(Error::ShortResponse { kind, address, count, got: words.len() });
        }
        let mut values = Vec::with_capacity(transaction.members.len());
        for member in &transaction.members {
            let register = member.register;
            let slice = &words[usize::from(member.offset)..];
            let value =
                codec::decode(register, slice).map_err(|e| Error::Decode(e, register.name))?;
            trace!(message = "decoded", register = register.name, %value);
            values.push((register.name, value));
        }
        let changed = self.store.merge(values);
        trace!(message = "merged", %kind, address, changed);
        Ok(())
    }

    async fn write(&mut self, register: &'static Descriptor, raw: RawWrite) -> Result<(), Error> {
        tokio::time::sleep(self.policy.delay).await;
        let (name, address) = (register.name, register.address);
        let write_error = move |source: transport::Error| Error::Write { source, name, address };
        self.transport.open().await.map_err(write_error)?;
        let result = match raw {
            RawWrite::Coil(value) => self.transport.write_coil(address, value).await,
            RawWrite::Register(value) => self.transport.write_register(address, value).await,
        };
        result.map_err(write_error)?;
        info!(message = "written", register = name, address, ?raw);
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.transport.close().await {
            warn!(
                message = "could not close the connection",
                host = %self.host(),
                error = (&e as &dyn std::error::Error)
            );
        }
    }

    fn refresh_firmware(&mut self) {
        match self.compose_firmware() {
            Ok(version) => self.firmware = Some(version),
            Err(e) => debug!(message = "firmware version left as is", reason = %e),
        }
    }

    fn compose_firmware(&self) -> Result<String, IncompleteData> {
        let part = |name: &'static str| {
            self.store.get(name).and_then(|v| v.as_integer()).ok_or(IncompleteData(name))
        };
        let [major, minor, micro] = FIRMWARE_PARTS;
        Ok(format!("{}.{}.{}", part(major)?, part(minor)?, part(micro)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Read(RegionKind, u16, u16),
        WriteCoil(u16, bool),
        WriteRegister(u16, u16),
    }

    /// Answers from fixed register contents and records what was asked of it.
    #[derive(Default)]
    struct FakeTransport {
        bits: BTreeMap<(RegionKind, u16), bool>,
        words: BTreeMap<(RegionKind, u16), u16>,
        calls: Vec<(Call, Instant)>,
        /// Fail the request with this index into `calls`.
        fail_on: Option<usize>,
        opened: usize,
        closed: usize,
        connected: bool,
    }

    impl FakeTransport {
        fn with_words(mut self, kind: RegionKind, words: &[(u16, u16)]) -> Self {
            self.words.extend(words.iter().map(|&(a, w)| ((kind, a), w)));
            self
        }

        fn with_bits(mut self, kind: RegionKind, bits: &[(u16, bool)]) -> Self {
            self.bits.extend(bits.iter().map(|&(a, b)| ((kind, a), b)));
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.iter().map(|(c, _)| *c).collect()
        }

        fn record(&mut self, call: Call) -> Result<(), transport::Error> {
            assert!(self.connected, "request while not connected");
            let index = self.calls.len();
            self.calls.push((call, Instant::now()));
            if self.fail_on == Some(index) {
                self.connected = false;
                return Err(transport::Error::Timeout(Duration::from_secs(3)));
            }
            Ok(())
        }

        fn read_bits(&self, kind: RegionKind, address: u16, count: u16) -> Vec<bool> {
            let bits = (address..address + count).map(|a| self.bits.get(&(kind, a)).copied());
            bits.map(Option::unwrap_or_default).collect()
        }

        fn read_words(&self, kind: RegionKind, address: u16, count: u16) -> Vec<u16> {
            let words = (address..address + count).map(|a| self.words.get(&(kind, a)).copied());
            words.map(Option::unwrap_or_default).collect()
        }
    }

    impl Transport for FakeTransport {
        fn peer(&self) -> String {
            "fake:502".into()
        }

        async fn open(&mut self) -> Result<(), transport::Error> {
            if !self.connected {
                self.opened += 1;
                self.connected = true;
            }
            Ok(())
        }

        async fn read_coils(&mut self, a: u16, n: u16) -> Result<Vec<bool>, transport::Error> {
            self.record(Call::Read(RegionKind::Coil, a, n))?;
            Ok(self.read_bits(RegionKind::Coil, a, n))
        }

        async fn read_discrete_inputs(
            &mut self,
            a: u16,
            n: u16,
        ) -> Result<Vec<bool>, transport::Error> {
            self.record(Call::Read(RegionKind::DiscreteInput, a, n))?;
            Ok(self.read_bits(RegionKind::DiscreteInput, a, n))
        }

        async fn read_input_registers(
            &mut self,
            a: u16,
            n: u16,
        ) -> Result<Vec<u16>, transport::Error> {
            self.record(Call::Read(RegionKind::InputRegister, a, n))?;
            Ok(self.read_words(RegionKind::InputRegister, a, n))
        }

        async fn read_holding_registers(
            &mut self,
            a: u16,
            n: u16,
        ) -> Result<Vec<u16>, transport::Error> {
            self.record(Call::Read(RegionKind::HoldingRegister, a, n))?;
            Ok(self.read_words(RegionKind::HoldingRegister, a, n))
        }

        async fn write_coil(&mut self, a: u16, value: bool) -> Result<(), transport::Error> {
            self.record(Call::WriteCoil(a, value))
        }

        async fn write_register(&mut self, a: u16, value: u16) -> Result<(), transport::Error> {
            self.record(Call::WriteRegister(a, value))
        }

        async fn close(&mut self) -> Result<(), transport::Error> {
            self.closed += 1;
            self.connected = false;
            Ok(())
        }
    }

    fn session(transport: FakeTransport) -> Session<FakeTransport> {
        Session::with_transport(transport, Catalog::GENESIS, Model::Inverter, Policy::default())
    }

    fn names(names: &[&str]) -> Selection {
        Selection::Names(names.iter().map(|n| n.to_string()).collect())
    }

    fn fake() -> FakeTransport {
        FakeTransport::default()
            .with_bits(RegionKind::Coil, &[(9, true)])
            .with_words(RegionKind::InputRegister, &[(1, 65036), (107, 9), (108, 2), (109, 15)])
            .with_words(RegionKind::HoldingRegister, &[(16, 1700)])
    }

    const THREE_REGIONS: [&str; 3] =
        ["holding_heat_stop", "input_outdoor_temperature", "coil_enable_heat"];

    #[tokio::test(start_paused = true)]
    async fn reads_and_decodes() {
        let mut session = session(fake());
        assert!(!session.available());
        session.update(&names(&THREE_REGIONS)).await.unwrap();
        assert_eq!(
            session.transport().calls(),
            [
                Call::Read(RegionKind::Coil, 9, 1),
                Call::Read(RegionKind::InputRegister, 1, 1),
                Call::Read(RegionKind::HoldingRegister, 16, 1),
            ]
        );
        let data = session.data();
        assert_eq!(data.len(), 3);
        assert_eq!(data.get("coil_enable_heat"), Some(Value::Bool(true)));
        assert_eq!(data.get("input_outdoor_temperature"), Some(Value::Number(-5.0)));
        assert_eq!(data.get("holding_heat_stop"), Some(Value::Number(17.0)));
        assert!(session.available());
        assert_eq!(session.host(), "fake:502");
        assert_eq!(session.model(), Model::Inverter);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_earlier_values() {
        let mut session = session(FakeTransport { fail_on: Some(1), ..fake() });
        let error = session.update(&names(&THREE_REGIONS)).await.unwrap_err();
        assert!(
            matches!(
                error,
                Error::Read {
                    source: transport::Error::Timeout(_),
                    kind: RegionKind::InputRegister,
                    address: 1,
                    count: 1,
                }
            ),
            "{error:?}"
        );
        assert!(error.transport().is_some());
        assert_eq!(error.exception_code(), None);
        assert_eq!(session.transport().calls().len(), 2);
        let data = session.data();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("coil_enable_heat"), Some(Value::Bool(true)));
        assert_eq!(session.transport().closed, 1);

        session.update(&names(&THREE_REGIONS)).await.unwrap();
        assert_eq!(session.data().len(), 3);
        assert_eq!(session.transport().closed, 2);
        assert_eq!(session.transport().opened, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_are_paced() {
        let mut session = session(fake());
        let start = Instant::now();
        session.update(&names(&THREE_REGIONS)).await.unwrap();
        let delays = session
            .transport()
            .calls
            .iter()
            .map(|(_, at)| *at - start)
            .collect::<Vec<_>>();
        assert_eq!(
            delays,
            [Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(300)]
        );

        let mut session = Session::with_transport(
            fake(),
            Catalog::GENESIS,
            Model::Mega,
            Policy { max_registers: 16, delay: Duration::from_secs(2) },
        );
        let start = Instant::now();
        session.set("coil_enable_heat", Value::Bool(false)).await.unwrap();
        assert_eq!(session.transport().calls[0].1 - start, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn reads_by_region() {
        let mut session = session(fake());
        session.update(&Selection::Kinds(vec![RegionKind::DiscreteInput])).await.unwrap();
        assert_eq!(
            session.transport().calls(),
            [
                Call::Read(RegionKind::DiscreteInput, 0, 5),
                Call::Read(RegionKind::DiscreteInput, 9, 16),
                Call::Read(RegionKind::DiscreteInput, 25, 3),
            ]
        );
        assert_eq!(session.data().len(), 19);
        assert_eq!(session.data().get("dinput_inverter_unit_alarm"), Some(Value::Bool(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn gated_register_is_read_after_its_gate() {
        const GATE: &str = "coil_enable_fixed_system_supply_set_point";
        const GATED: &str = "holding_fixed_system_supply_set_point";
        let transport = fake()
            .with_bits(RegionKind::Coil, &[(42, true)])
            .with_words(RegionKind::HoldingRegister, &[(31, 3500)]);
        let mut session = session(transport);
        session.update(&names(&[GATED, GATE])).await.unwrap();
        assert_eq!(
            session.transport().calls(),
            [Call::Read(RegionKind::Coil, 42, 1), Call::Read(RegionKind::HoldingRegister, 31, 1)]
        );
        assert_eq!(session.data().get(GATED), Some(Value::Number(35.0)));

        // With the gate already known, one pass suffices.
        session.update(&names(&[GATED])).await.unwrap();
        assert_eq!(session.transport().calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gated_register_is_not_read_while_closed() {
        const GATE: &str = "coil_enable_fixed_system_supply_set_point";
        const GATED: &str = "holding_fixed_system_supply_set_point";
        let mut session = session(fake());
        session.update(&names(&[GATED])).await.unwrap();
        assert!(session.transport().calls().is_empty());
        assert!(!session.available());

        session.update(&names(&[GATED, GATE])).await.unwrap();
        assert_eq!(session.transport().calls(), [Call::Read(RegionKind::Coil, 42, 1)]);
        assert_eq!(session.data().get(GATE), Some(Value::Bool(false)));
        assert_eq!(session.data().get(GATED), None);
    }

    #[tokio::test(start_paused = true)]
    async fn writes() {
        let mut session = session(fake());
        let value = session.set("holding_heat_stop", Value::Number(-5.0)).await.unwrap();
        assert_eq!(value, Value::Number(-5.0));
        session.set("coil_enable_heat", Value::Integer(1)).await.unwrap();
        assert_eq!(
            session.transport().calls(),
            [Call::WriteRegister(16, 65036), Call::WriteCoil(9, true)]
        );
        assert!(!session.available());
        assert_eq!(session.transport().closed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_writes_do_not_reach_the_device() {
        let mut session = session(fake());
        let error = session.set("input_outdoor_temperature", Value::Number(1.0)).await;
        assert!(error.unwrap_err().is_not_writable());
        let error = session.set("holding_modbus_slave_address", Value::Integer(2)).await;
        assert!(error.unwrap_err().is_not_writable());
        let error = session.set("holding_heat_stop", Value::Bool(true)).await.unwrap_err();
        assert!(matches!(error, Error::Encode(codec::Error::WrongValueType { .. }, _)));
        let error = session.set("holding_bogus", Value::Integer(1)).await.unwrap_err();
        assert!(matches!(error, Error::Catalog(registers::Error::UnknownRegister(_))));
        let error = session.update(&names(&["coil_enable_heat", "bogus"])).await.unwrap_err();
        assert!(matches!(error, Error::Catalog(_)));
        assert!(session.transport().calls().is_empty());
        assert_eq!(session.transport().opened, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn registers_outside_the_model_ranges_are_rejected() {
        let mut session = session(fake());
        let error = session.update(&names(&["input_compressor_current_gear"])).await.unwrap_err();
        assert!(matches!(
            error,
            Error::Plan(planner::Error::OutsideValidRange { address: 44, .. })
        ));
        assert!(session.transport().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_closes_the_connection() {
        let mut session = session(FakeTransport { fail_on: Some(0), ..fake() });
        let error = session.set("coil_enable_heat", Value::Bool(true)).await.unwrap_err();
        assert!(matches!(error, Error::Write { name: "coil_enable_heat", address: 9, .. }));
        assert_eq!(session.transport().closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn firmware_version() {
        let mut session = session(fake());
        assert_eq!(
            session.compose_firmware(),
            Err(IncompleteData("input_software_version_major"))
        );
        session.update(&names(&["input_software_version_major"])).await.unwrap();
        assert_eq!(session.firmware_version(), None);
        assert_eq!(
            session.compose_firmware(),
            Err(IncompleteData("input_software_version_minor"))
        );
        session.update(&Selection::Kinds(vec![RegionKind::InputRegister])).await.unwrap();
        assert_eq!(session.firmware_version(), Some("9.2.15"));
    }

    #[tokio::test(start_paused = true)]
    async fn firmware_version_survives_a_later_failure() {
        let mut session = session(FakeTransport { fail_on: Some(4), ..fake() });
        let kinds = vec![RegionKind::InputRegister, RegionKind::HoldingRegister];
        let error = session.update(&Selection::Kinds(kinds)).await.unwrap_err();
        assert!(
            matches!(error, Error::Read { kind: RegionKind::HoldingRegister, .. }),
            "{error:?}"
        );
        assert_eq!(
            session.transport().calls()[3],
            Call::Read(RegionKind::InputRegister, 100, 10)
        );
        assert_eq!(session.firmware_version(), Some("9.2.15"));
    }

    #[test]
    fn tcp_session() {
        let session = Session::new("heatpump.local", 5020, Model::Mega, 8, Duration::ZERO);
        assert_eq!(session.host(), "heatpump.local:5020");
        assert_eq!(session.model(), Model::Mega);
        assert_eq!(session.policy(), Policy { max_registers: 8, delay: Duration::ZERO });
        assert_eq!(session.firmware_version(), None);
        assert!(!session.available());
    }

    #[tokio::test(start_paused = true)]
    async fn whole_catalog_update() {
        let mut session = session(fake());
        session.update(&Selection::All).await.unwrap();
        let expected = Catalog::GENESIS
            .all_applicable(Model::Inverter)
            .filter(|d| d.gate.is_none())
            .count();
        assert_eq!(session.data().len(), expected);
        assert_eq!(session.transport().closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_names_means_every_register() {
        let mut everything = session(fake());
        everything.update(&Selection::All).await.unwrap();
        let mut session = session(fake());
        session.update(&Selection::Names(Vec::new())).await.unwrap();
        assert!(session.available());
        assert_eq!(session.transport().calls(), everything.transport().calls());
        assert_eq!(session.data(), everything.data());
    }

    #[tokio::test(start_paused = true)]
    async fn requests_too_short_for_wide_registers_are_rejected() {
        let policy = Policy { max_registers: 1, ..Policy::default() };
        let mut session =
            Session::with_transport(fake(), Catalog::GENESIS, Model::Inverter, policy);
        let error = session.update(&Selection::All).await.unwrap_err();
        assert!(
            matches!(error, Error::Plan(planner::Error::TooNarrow { words: 2, max: 1, .. })),
            "{error:?}"
        );
        assert!(session.transport().calls().is_empty());
        assert_eq!(session.data().len(), 0);

        session.update(&names(&THREE_REGIONS)).await.unwrap();
        assert_eq!(session.data().len(), 3);
    }
}
