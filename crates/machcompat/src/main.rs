use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use machcompat_core::prelude::*;
use machcompat_protocol::header::{MSG_HEADER_SIZE, NDR_RECORD_SIZE};
use machcompat_protocol::info::{TASK_BASIC_INFO, TASK_EVENTS_INFO, TASK_INFO_MAX};
use machcompat_protocol::wire::WireReader;
use machcompat_protocol::{MsgHeader, Request, TaskInfoRecord, TrapId, TrapRequest};
use machcompat_utils::{info, init_with_config, LogConfig, LogFormat, LogLevel};

/// Drive Mach task-control traps against host processes.
#[derive(Parser, Debug)]
#[command(name = "machcompat")]
#[command(version)]
#[command(about = "Drive Mach task-control traps against host processes", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format: pretty or json (overrides MACHCOMPAT_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Show special ports, threads, info records and exception ports of a task
    Inspect
    {
        /// Process ID (PID) of the target
        pid: u32,
    },
    /// Send task_suspend to a task
    Suspend
    {
        /// Process ID (PID) of the target
        pid: u32,
    },
    /// Send task_resume to a task
    Resume
    {
        /// Process ID (PID) of the target
        pid: u32,
    },
    /// Obtain a task port with task_for_pid from this process's own task
    Lookup
    {
        /// Process ID (PID) of the target
        pid: u32,
    },
    /// Sample basic task info periodically
    Watch
    {
        /// Process ID (PID) of the target
        pid: u32,
        /// Milliseconds between samples
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Number of samples (0 = until interrupted)
        #[arg(long, default_value_t = 0)]
        count: u64,
    },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main()
{
    let cli = Cli::parse();

    let _guard = match init_cli_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    let result = if matches!(cli.command, Commands::Watch { .. }) {
        tokio::runtime::Runtime::new()
            .map_err(Into::into)
            .and_then(|rt| rt.block_on(run_watch(cli.command)))
    } else {
        run_command(cli.command)
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_cli_logging(cli: &Cli) -> CliResult<machcompat_utils::LoggingGuard>
{
    let mut config = LogConfig::from_env()?;
    if let Some(format) = cli.log_format {
        config.format = format;
    }
    config.level_override = cli.log_level.map(Into::into);
    Ok(init_with_config(&config)?)
}

/// A shim over the live host with this process and `pid` registered.
struct Session
{
    shim: Shim,
    registry: Arc<LocalRegistry>,
    me: ProcessId,
    target: ProcessId,
}

impl Session
{
    #[cfg(target_os = "linux")]
    fn open(pid: u32) -> CliResult<Self>
    {
        use machcompat_core::host::linux;

        let registry = Arc::new(LocalRegistry::new());
        let shim = Shim::new(registry.clone(), Arc::new(LocalOolArena::new()), Arc::new(linux::LinuxHost::new()));
        let me = linux::current_pid();
        let target = ProcessId(pid);

        // Fail early with a host error instead of an error reply
        shim.host().credentials(target)?;
        shim.register_task(me);
        shim.register_task(target);
        info!(%me, %target, "session opened");
        Ok(Self {
            shim,
            registry,
            me,
            target,
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn open(_pid: u32) -> CliResult<Self>
    {
        Err("no host backend for this platform".into())
    }

    fn context(&self) -> ShimResult<TrapContext>
    {
        self.shim.context(self.me, self.target)
    }

    /// Send one trap message and return the reply's return code.
    fn send_simple(&self, trap: TrapId) -> CliResult<i32>
    {
        let request = Request {
            header: MsgHeader {
                local_port: 1,
                ..MsgHeader::default()
            },
            trap,
            body: TrapRequest::Empty,
        };
        let mut buf = [0u8; 64];
        let len = request.encode(&mut buf)?;

        let mut reply = [0u8; 64];
        self.shim.handle_message(self.me, self.target, &buf[..len], &mut reply)?;
        let mut reader = WireReader::new(&reply);
        reader.skip(MSG_HEADER_SIZE + NDR_RECORD_SIZE)?;
        Ok(reader.i32()?)
    }
}

fn run_command(command: Commands) -> CliResult<()>
{
    match command {
        Commands::Inspect { pid } => inspect(&Session::open(pid)?),
        Commands::Suspend { pid } => {
            let session = Session::open(pid)?;
            let retval = session.send_simple(TrapId::Suspend)?;
            println!("task_suspend({pid}) = {retval}");
            Ok(())
        }
        Commands::Resume { pid } => {
            let session = Session::open(pid)?;
            let retval = session.send_simple(TrapId::Resume)?;
            println!("task_resume({pid}) = {retval}");
            Ok(())
        }
        Commands::Lookup { pid } => {
            let session = Session::open(pid)?;
            let control = Port::new(PortKind::User);
            let control_name = session.registry.insert(session.me, &control, RightType::Receive);
            let name = session.shim.task_for_pid(session.me, control_name, session.target)?;
            println!("task_for_pid({pid}) = 0x{name:x}");
            Ok(())
        }
        Commands::Watch { .. } => Err("watch runs on the async runtime".into()),
    }
}

fn inspect(session: &Session) -> CliResult<()>
{
    let ctx = session.context()?;
    let shim = &session.shim;

    println!("Task {}", session.target);
    println!("  Special ports:");
    for which in SpecialPort::BOUND {
        match shim.task_get_special_port(&ctx, which.raw())? {
            TrapReply::SpecialPort(name) => println!("    {which:?}: 0x{name:x}"),
            other => println!("    {which:?}: {other:?}"),
        }
    }

    if let TrapReply::Threads { count, .. } = shim.task_threads(&ctx)? {
        println!("  Threads: {count}");
    }

    for flavor in [TASK_BASIC_INFO, TASK_EVENTS_INFO] {
        match shim.task_info(&ctx, flavor, TASK_INFO_MAX)? {
            TrapReply::Info(TaskInfoRecord::Basic(basic)) => {
                println!(
                    "  Basic: suspend_count={} virtual={} resident={} user={}.{:06}s system={}.{:06}s",
                    basic.suspend_count,
                    basic.virtual_size,
                    basic.resident_size,
                    basic.user_time.seconds,
                    basic.user_time.microseconds,
                    basic.system_time.seconds,
                    basic.system_time.microseconds,
                );
            }
            TrapReply::Info(TaskInfoRecord::Events(events)) => {
                println!(
                    "  Events: faults={} pageins={} messages={}/{} csw={}",
                    events.faults, events.pageins, events.messages_sent, events.messages_received, events.csw
                );
            }
            other => println!("  {other:?}"),
        }
    }

    if let TrapReply::ExceptionPorts(entries) = shim.task_get_exception_ports(&ctx, !0)? {
        println!("  Exception ports: {}", entries.len());
        for entry in entries {
            println!(
                "    mask=0x{:x} port=0x{:x} behavior={} flavor={}",
                entry.mask, entry.port, entry.behavior, entry.flavor
            );
        }
    }
    Ok(())
}

async fn run_watch(command: Commands) -> CliResult<()>
{
    let Commands::Watch {
        pid,
        interval_ms,
        count,
    } = command
    else {
        return Err("not a watch command".into());
    };

    let session = Session::open(pid)?;
    let ctx = session.context()?;
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut taken = 0u64;

    while count == 0 || taken < count {
        ticker.tick().await;
        let reply = session.shim.task_info(&ctx, TASK_BASIC_INFO, TASK_INFO_MAX)?;
        if let TrapReply::Info(TaskInfoRecord::Basic(basic)) = reply {
            println!(
                "{} pid={pid} resident={} virtual={} user={}.{:06}s system={}.{:06}s",
                Local::now().format("%H:%M:%S%.3f"),
                basic.resident_size,
                basic.virtual_size,
                basic.user_time.seconds,
                basic.user_time.microseconds,
                basic.system_time.seconds,
                basic.system_time.microseconds,
            );
        }
        taken += 1;
    }
    Ok(())
}
