// Courier client: interactive menu over one-connection-per-request exchanges.

mod storage;

use std::io::{self, BufRead, Write};
use std::net::TcpStream;

use anyhow::{bail, Context, Result};
use courier_core::dispatch::{Connector, ExchangeError};
use courier_core::identity::{LocalIdentity, PeerName};
use courier_core::keys::Keypair;
use courier_core::session::{MessageBody, PulledMessage, SessionController, SessionError};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dials a fresh TCP connection per exchange, as the protocol expects.
struct TcpConnector {
    host: String,
    port: u16,
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> io::Result<TcpStream> {
        TcpStream::connect((self.host.as_str(), self.port))
    }
}

fn main() -> Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("courier-cli {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let dir = storage::data_dir();
    let server = storage::load_server_addr(&dir)?;
    tracing::debug!(host = %server.host, port = server.port, "using server address");

    let identity = match storage::load_identity(&dir)? {
        Some(saved) => {
            let keypair = Keypair::from_encoded(&saved.encoded_private_key)
                .context("identity file holds an unusable private key")?;
            tracing::debug!(name = %saved.name, id = %saved.id, "restored identity");
            LocalIdentity::restored(saved.id, PeerName::new(&saved.name), keypair)
        }
        None => LocalIdentity::unregistered(
            Keypair::generate().context("could not generate an identity keypair")?,
        ),
    };

    let connector = TcpConnector {
        host: server.host,
        port: server.port,
    };
    let mut controller = SessionController::new(identity, connector);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        print_menu();
        let Some(line) = read_line(&mut input)? else {
            return Ok(());
        };
        let choice = line.trim();
        let outcome = match choice {
            "0" => return Ok(()),
            "110" => do_register(&mut controller, &mut input),
            "120" => do_list(&mut controller),
            "130" => do_fetch_public_key(&mut controller, &mut input),
            "140" => do_pull(&mut controller),
            "150" => do_send_text(&mut controller, &mut input),
            "151" => do_request_symmetric_key(&mut controller, &mut input),
            "152" => do_send_symmetric_key(&mut controller, &mut input),
            "" => continue,
            other => {
                println!("unknown option: {other}");
                continue;
            }
        };
        if let Err(err) = outcome {
            // Transport failures end the session; everything else is
            // reported and the menu comes back.
            if matches!(
                err.downcast_ref::<SessionError>(),
                Some(SessionError::Exchange(ExchangeError::Transport(_)))
            ) {
                bail!("server unreachable: {err:#}");
            }
            println!("error: {err:#}");
        }
    }
}

fn print_menu() {
    println!();
    println!("Courier client at your service.");
    println!();
    println!("110) Register");
    println!("120) Request for clients list");
    println!("130) Request for public key");
    println!("140) Request for waiting messages");
    println!("150) Send a text message");
    println!("151) Send a request for symmetric key");
    println!("152) Send your symmetric key");
    println!("0) Exit client");
    print!("? ");
    let _ = io::stdout().flush();
}

/// One line from stdin; `None` on EOF.
fn read_line(input: &mut impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    let n = input.read_line(&mut line).context("cannot read input")?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn prompt(input: &mut impl BufRead, what: &str) -> Result<String> {
    print!("{what}: ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    input.read_line(&mut line).context("cannot read input")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn do_register(
    controller: &mut SessionController<TcpConnector>,
    input: &mut impl BufRead,
) -> Result<()> {
    let name = prompt(input, "Enter your name")?;
    let id = controller.register(&name)?;
    println!("Registered as {name} ({id})");

    // Persist immediately; losing the id or key orphans the registration.
    let saved = storage::SavedIdentity {
        name: controller.identity().name().as_str().to_string(),
        id,
        encoded_private_key: controller.identity().keypair().encoded_private()?,
    };
    if let Err(err) = storage::save_identity(&storage::data_dir(), &saved) {
        tracing::error!("could not save identity: {err:#}");
        println!("warning: identity not saved; this registration is lost on exit");
    }
    Ok(())
}

fn do_list(controller: &mut SessionController<TcpConnector>) -> Result<()> {
    let records = controller.list_peers()?;
    if records.is_empty() {
        println!("No other clients registered.");
        return Ok(());
    }
    for record in &records {
        println!("{}  {}", record.id, record.name);
    }
    Ok(())
}

fn do_fetch_public_key(
    controller: &mut SessionController<TcpConnector>,
    input: &mut impl BufRead,
) -> Result<()> {
    let name = prompt(input, "Peer name")?;
    controller.fetch_public_key(&name)?;
    println!("Public key stored for {name}");
    Ok(())
}

fn do_pull(controller: &mut SessionController<TcpConnector>) -> Result<()> {
    let messages = controller.pull_messages()?;
    if messages.is_empty() {
        println!("No waiting messages.");
        return Ok(());
    }
    for message in &messages {
        print_message(message);
    }
    Ok(())
}

fn print_message(message: &PulledMessage) {
    println!("From: {}", message.sender_name);
    println!("Content:");
    match &message.body {
        Ok(MessageBody::Text(text)) => println!("{text}"),
        Ok(MessageBody::KeyRequest) => println!("Request for symmetric key"),
        Ok(MessageBody::KeyStored) => println!("Symmetric key received"),
        Err(err) => println!("Can't display message: {err}"),
    }
    println!("-----<EOM>-----");
    println!();
}

fn do_send_text(
    controller: &mut SessionController<TcpConnector>,
    input: &mut impl BufRead,
) -> Result<()> {
    let name = prompt(input, "Peer name")?;
    let text = prompt(input, "Message")?;
    let message_id = controller.send_text(&name, &text)?;
    println!("Message {message_id} sent to {name}");
    Ok(())
}

fn do_request_symmetric_key(
    controller: &mut SessionController<TcpConnector>,
    input: &mut impl BufRead,
) -> Result<()> {
    let name = prompt(input, "Peer name")?;
    controller.request_symmetric_key(&name)?;
    println!("Symmetric key requested from {name}");
    Ok(())
}

fn do_send_symmetric_key(
    controller: &mut SessionController<TcpConnector>,
    input: &mut impl BufRead,
) -> Result<()> {
    let name = prompt(input, "Peer name")?;
    controller.exchange_symmetric_key(&name)?;
    println!("Symmetric key sent to {name}");
    Ok(())
}
