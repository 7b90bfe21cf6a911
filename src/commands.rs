fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

pub mod registers {
    use crate::output::{self, Record};
    use crate::registers::{Catalog, Descriptor, Model};

    /// Search and output known Modbus registers.
    #[derive(clap::Parser)]
    pub struct Args {
        /// Only show registers whose name, region or address contains this text.
        filter: Option<String>,
        /// Only show registers exposed by this model.
        #[arg(long, short = 'm', value_enum)]
        model: Option<Model>,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not output the registers")]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    struct RegisterRecord<'a>(&'a Descriptor);

    impl Record for RegisterRecord<'_> {
        const HEADERS: &'static [&'static str] =
            &["Region", "Address", "Name", "Type", "Scale", "Mode", "Models", "Gate"];

        fn cells(&self) -> Vec<String> {
            let d = self.0;
            vec![
                d.kind.to_string(),
                d.address.to_string(),
                d.name.to_string(),
                d.data_type.to_string(),
                d.scale.to_string(),
                d.mode.to_string(),
                d.models.to_string(),
                d.gate
                    .map(|g| format!("{} == {}", g.register, g.required))
                    .unwrap_or_default(),
            ]
        }
    }

    pub fn is_match(register: &Descriptor, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        register.name.contains(&pattern)
            || register.kind.to_string().contains(&pattern)
            || register.address.to_string().contains(&pattern)
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let mut output = args.output.to_output()?;
        for register in Catalog::GENESIS.registers() {
            if let Some(pattern) = &args.filter {
                if !is_match(register, pattern) {
                    continue;
                }
            }
            if let Some(model) = args.model {
                if !register.is_applicable(model) {
                    continue;
                }
            }
            output.record(&RegisterRecord(register))?;
        }
        Ok(output.commit()?)
    }
}

pub mod read {
    use crate::codec::Value;
    use crate::connection::{self, TcpTransport};
    use crate::output::{self, Record};
    use crate::registers::{Catalog, RegionKind};
    use crate::session::{self, Selection, Session};

    /// Read registers from the heat pump and output their values.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        session: session::Args,
        /// Read all registers of this region. May be given multiple times.
        #[arg(long = "kind", short = 'k', value_enum)]
        kinds: Vec<RegionKind>,
        /// Read these registers. Everything the model exposes is read if neither registers nor
        /// regions are given.
        #[arg(long = "register", short = 'r')]
        names: Vec<String>,
        #[clap(flatten)]
        output: output::Args,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("could not read the registers")]
        Session(#[from] session::Error),
        #[error("could not output the values")]
        Output(#[from] output::Error),
    }

    #[derive(serde::Serialize)]
    struct ValueRecord {
        kind: RegionKind,
        address: u16,
        name: &'static str,
        value: Value,
    }

    impl Record for ValueRecord {
        const HEADERS: &'static [&'static str] = &["Region", "Address", "Name", "Value"];

        fn cells(&self) -> Vec<String> {
            vec![
                self.kind.to_string(),
                self.address.to_string(),
                self.name.to_string(),
                self.value.to_string(),
            ]
        }
    }

    impl Args {
        pub fn selection(&self) -> Selection {
            if !self.names.is_empty() {
                let mut names = self.names.clone();
                let catalog = Catalog::GENESIS;
                let model = self.session.model();
                names.extend(catalog.of_kinds(model, &self.kinds).map(|d| d.name.to_string()));
                Selection::Names(names)
            } else if !self.kinds.is_empty() {
                Selection::Kinds(self.kinds.clone())
            } else {
                Selection::All
            }
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let selection = args.selection();
        let transport = TcpTransport::new(args.connection.options());
        let mut session = Session::with_transport(
            transport,
            Catalog::GENESIS,
            args.session.model(),
            args.session.policy(),
        );
        let rt = super::runtime().map_err(Error::Runtime)?;
        rt.block_on(session.update(&selection))?;

        eprintln!(
            "{} at {}, firmware {}",
            session.model(),
            session.host(),
            session.firmware_version().unwrap_or("unknown")
        );
        let data = session.data();
        let mut output = args.output.to_output()?;
        for register in Catalog::GENESIS.registers() {
            let Some(value) = data.get(register.name) else {
                continue;
            };
            output.record(&ValueRecord {
                kind: register.kind,
                address: register.address,
                name: register.name,
                value,
            })?;
        }
        Ok(output.commit()?)
    }
}

pub mod write {
    use crate::codec;
    use crate::connection::{self, TcpTransport};
    use crate::registers::{self, Catalog};
    use crate::session::{self, Session};

    /// Write a value to a single register of the heat pump.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        session: session::Args,
        /// The register to write.
        name: String,
        /// The value to write, in the same units as it is read.
        ///
        /// Coils accept `true`, `false`, `on`, `off`, `1` or `0`.
        #[arg(allow_negative_numbers = true)]
        value: String,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error(transparent)]
        Catalog(#[from] registers::Error),
        #[error("invalid value")]
        Parse(#[from] codec::Error),
        #[error("could not write the register")]
        Session(#[from] session::Error),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let catalog = Catalog::GENESIS;
        let register = catalog.lookup(&args.name)?;
        let value = codec::parse(register, &args.value)?;
        let transport = TcpTransport::new(args.connection.options());
        let mut session = Session::with_transport(
            transport,
            catalog,
            args.session.model(),
            args.session.policy(),
        );
        let rt = super::runtime().map_err(Error::Runtime)?;
        let accepted = rt.block_on(session.set(register.name, value))?;
        println!("{} = {accepted}", register.name);
        Ok(())
    }
}
