//! Remote I/O demonstration
//!
//! Brings the session up, performs file I/O on the host, then runs an interactive console
//! dialogue until the operator asks to stop. Prompts match what the host proxy expects to
//! display.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::config::Config;
use crate::console::{Console, ConsoleIo, Token};
use crate::core::{Mode, OpenFlags};
use crate::error::Error;
use crate::lifecycle::{Manager, Session};
use crate::retarget::Retarget;
use crate::transport::adapter::Transport;
use crate::transport::platform::Platform;

/// File created on the host
pub const FILE_NAME: &str = "remote.file";

/// Content written to [`FILE_NAME`]
pub const TEST_STRING: &str = "This is a test string being written to file..";

/// Size of the buffer the file content is read into
pub const READ_BUFFER_LEN: usize = 1024;

/// How the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ending {
    /// The operator declined to repeat the demo.
    UserStop,
    /// The host released the channel while the demo was running.
    PeerShutdown,
}

/// Runs the whole demonstration: platform init, handshake, script and shutdown.
pub async fn run<'a, M, T, P>(
    mut platform: P,
    session: &'a Session<M>,
    transport: T,
    config: Config,
) -> Result<Ending, Error>
where
    M: RawMutex + Sync + 'a,
    T: Transport<'a>,
    P: Platform,
{
    if let Err(err) = platform.init() {
        error!("Platform initialization failed: {:?}", err);
        return Err(Error::PlatformInitFailure);
    }

    let mut manager = Manager::new(session, transport, config);
    manager.start()?;

    let outcome = match manager.wait_ready().await {
        Ok(_) => {
            let retarget = manager.retarget();
            script(&retarget).await
        }
        Err(err) => Err(err),
    };

    info!("Session going down");
    manager.shutdown()?;
    outcome
}

/// Blocking version of [`run`] for entry points without an executor.
///
/// # Examples:
///
/// ```no_run
/// use amprpc::config::Config;
/// use amprpc::demo::{self, Ending};
/// use amprpc::lifecycle::Session;
/// use amprpc::transport::adapter::Transport;
/// use amprpc::transport::platform::Platform;
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
/// use static_cell::StaticCell;
///
/// static SESSION: StaticCell<Session<CriticalSectionRawMutex>> = StaticCell::new();
///
/// fn entry(platform: impl Platform, transport: impl Transport<'static>) -> i32 {
///     let session = SESSION.init(Session::new());
///     match demo::run_blocking(platform, session, transport, Config::default()) {
///         Ok(Ending::UserStop | Ending::PeerShutdown) => 0,
///         Err(_) => -1,
///     }
/// }
/// ```
pub fn run_blocking<'a, M, T, P>(
    platform: P,
    session: &'a Session<M>,
    transport: T,
    config: Config,
) -> Result<Ending, Error>
where
    M: RawMutex + Sync + 'a,
    T: Transport<'a>,
    P: Platform,
{
    embassy_futures::block_on(run(platform, session, transport, config))
}

/// Runs the scripted file I/O and the interactive dialogue over an established channel.
///
/// Sends the close intent when the operator stops the demo.
pub async fn script<'a, M, T>(retarget: &Retarget<'_, 'a, M, T>) -> Result<Ending, Error>
where
    M: RawMutex + Sync + 'a,
    T: Transport<'a>,
{
    let mut console = Console::new(retarget);
    let result = async {
        console
            .print(format_args!(
                "\r\nRemote>Baremetal Remote Procedure Call (RPC) Demonstration\r\n"
            ))
            .await?;
        console
            .print(format_args!(
                "\r\nRemote>***************************************************\r\n"
            ))
            .await?;
        console
            .print(format_args!(
                "\r\nRemote>Rpmsg based retargetting to proxy initialized..\r\n"
            ))
            .await?;

        file_io(retarget, &mut console).await?;
        interactive(&mut console).await?;
        // Last line the host can display: requests fail once the close intent is out
        console
            .print(format_args!(
                "\r\nRemote> Firmware's rpmsg-openamp-demo-channel going down! \r\n"
            ))
            .await?;
        retarget.send_close_intent()
    }
    .await;

    match result {
        Ok(()) => Ok(Ending::UserStop),
        Err(Error::ChannelClosing) => {
            info!("Host ended the session");
            Ok(Ending::PeerShutdown)
        }
        Err(err) => Err(err),
    }
}

/// Runs console dialogue rounds until the operator answers `no`.
pub async fn interactive<C: ConsoleIo>(console: &mut Console<C>) -> Result<(), Error> {
    loop {
        console
            .print(format_args!(
                "\r\nRemote>Remote firmware using scanf and printf ..\r\n"
            ))
            .await?;
        console
            .print(format_args!("\r\nRemote>Scanning user input from master..\r\n"))
            .await?;

        let Some(entry) = read_entry(console).await? else {
            console
                .print(format_args!("Remote> Invalid value. Starting again...."))
                .await?;
            continue;
        };
        console
            .print(format_args!("\r\nRemote>User name = '{}'\r\n", entry.name))
            .await?;
        console
            .print(format_args!("\r\nRemote>User age = '{}'\r\n", entry.age))
            .await?;
        console
            .print(format_args!(
                "\r\nRemote>User entered value of pi = '{:.6}'\r\n",
                entry.pi
            ))
            .await?;

        console
            .print(format_args!(
                "\r\nRemote>Repeat demo ? (enter yes or no) \r\n"
            ))
            .await?;
        match console.read_token().await?.as_deref() {
            Some("yes") => (),
            Some("no") => {
                console
                    .print(format_args!("\r\nRemote>RPC retargetting quitting ...\r\n"))
                    .await?;
                return Ok(());
            }
            _ => {
                console
                    .print(format_args!(
                        "\r\nRemote>Invalid option. Starting again....\r\n"
                    ))
                    .await?;
            }
        }
    }
}

struct Entry {
    name: Token,
    age: i32,
    pi: f32,
}

async fn read_entry<C: ConsoleIo>(console: &mut Console<C>) -> Result<Option<Entry>, Error> {
    console
        .print(format_args!("\r\nRemote>Enter name\r\n"))
        .await?;
    let Some(name) = console.read_token().await? else {
        return Ok(None);
    };
    console
        .print(format_args!("\r\nRemote>Enter age\r\n"))
        .await?;
    let Some(age) = console.scan::<i32>().await? else {
        return Ok(None);
    };
    console
        .print(format_args!("\r\nRemote>Enter value for pi\r\n"))
        .await?;
    let Some(pi) = console.scan::<f32>().await? else {
        return Ok(None);
    };
    Ok(Some(Entry { name, age, pi }))
}

async fn file_io<'a, M, T>(
    retarget: &Retarget<'_, 'a, M, T>,
    console: &mut Console<&Retarget<'_, 'a, M, T>>,
) -> Result<(), Error>
where
    M: RawMutex + Sync + 'a,
    T: Transport<'a>,
{
    console
        .print(format_args!("\r\nRemote>FileIO demo ..\r\n"))
        .await?;
    console
        .print(format_args!(
            "\r\nRemote>Creating a file on master and writing to it..\r\n"
        ))
        .await?;

    let flags = OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::APPEND;
    let mode = Mode::S_IRUSR | Mode::S_IWUSR;
    match retarget.open(FILE_NAME, flags, mode).await {
        Ok(fd) => {
            console
                .print(format_args!(
                    "\r\nRemote>Opened file '{}' with fd = {}\r\n",
                    FILE_NAME,
                    fd.into_i32()
                ))
                .await?;
            match retarget.write(fd, TEST_STRING.as_bytes()).await {
                Ok(written) => {
                    console
                        .print(format_args!(
                            "\r\nRemote>Wrote to fd = {}, size = {}, content = {}\r\n",
                            fd.into_i32(),
                            written,
                            TEST_STRING
                        ))
                        .await?
                }
                Err(err) => report(console, "write", err).await?,
            }
            close(retarget, console, fd).await?;
        }
        Err(err) => report(console, "open", err).await?,
    }

    console
        .print(format_args!(
            "\r\nRemote>Reading a file on master and displaying its contents..\r\n"
        ))
        .await?;
    match retarget.open(FILE_NAME, OpenFlags::RDONLY, mode).await {
        Ok(fd) => {
            console
                .print(format_args!(
                    "\r\nRemote>Opened file '{}' with fd = {}\r\n",
                    FILE_NAME,
                    fd.into_i32()
                ))
                .await?;
            let mut buf = [0u8; READ_BUFFER_LEN];
            match retarget.read(fd, &mut buf).await {
                Ok(len) => {
                    console
                        .print(format_args!(
                            "\r\nRemote>Read from fd = {}, size = {}, printing contents below .. ",
                            fd.into_i32(),
                            len
                        ))
                        .await?;
                    console.write_bytes(&buf[..len]).await?;
                    console.write_bytes(b"\r\n").await?;
                }
                Err(err) => report(console, "read", err).await?,
            }
            close(retarget, console, fd).await?;
        }
        Err(err) => report(console, "open", err).await?,
    }
    Ok(())
}

async fn close<'a, M, T>(
    retarget: &Retarget<'_, 'a, M, T>,
    console: &mut Console<&Retarget<'_, 'a, M, T>>,
    fd: crate::core::FileHandle,
) -> Result<(), Error>
where
    M: RawMutex + Sync + 'a,
    T: Transport<'a>,
{
    match retarget.close(fd).await {
        Ok(()) => {
            console
                .print(format_args!("\r\nRemote>Closed fd = {}\r\n", fd.into_i32()))
                .await
        }
        Err(err) => report(console, "close", err).await,
    }
}

// Remote failures are shown to the operator, anything else ends the script
async fn report<C: ConsoleIo>(
    console: &mut Console<C>,
    operation: &str,
    err: Error,
) -> Result<(), Error> {
    match err {
        Error::RemoteOperationError(_) | Error::ProtocolViolation(_) => {
            warn!("Remote {} failed: {:?}", operation, err);
            console
                .print(format_args!(
                    "\r\nRemote>Error: {} failed: {:?}\r\n",
                    operation, err
                ))
                .await
        }
        err => Err(err),
    }
}
