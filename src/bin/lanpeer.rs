//! Console front-end: discovers peers on the LAN and chats with them.
//!
//! Usage: `lanpeer [CONFIG] --user NAME`

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::{env, process, thread};

use lanpeer::PeerEvent;
use lanpeer::config::{Config, ServiceConfig};
use lanpeer::core::LanPeerService;
use lanpeer::log::{LogSink, logger::Logger};

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} [CONFIG] --user NAME");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  /msg PEER TEXT   send a chat message");
    eprintln!("  /status TEXT     change advertised status");
    eprintln!("  /peers           list discovered peers");
    eprintln!("  /call PEER       offer a call");
    eprintln!("  /hangup PEER     end the call with PEER");
    eprintln!("  /quit            announce offline and exit");
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map_or("lanpeer", String::as_str).to_owned();

    let mut config_path: Option<String> = None;
    let mut username: Option<String> = None;
    let mut it = args.iter().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--user" | "-u" => username = it.next().cloned(),
            "--help" | "-h" => usage(&prog),
            other if config_path.is_none() => config_path = Some(other.to_owned()),
            _ => usage(&prog),
        }
    }

    let config = match config_path.as_deref() {
        Some(path) => Config::load(path).unwrap_or_else(|e| {
            eprintln!("Error loading config: {e}. Using defaults.");
            Config::empty()
        }),
        None => Config::load("lanpeer.conf").unwrap_or_else(|_| Config::empty()),
    };
    let Some(username) = username.or_else(|| config.get_global("username").map(str::to_owned))
    else {
        usage(&prog)
    };
    let svc_cfg = match ServiceConfig::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    let logger = Logger::start(&svc_cfg.logging);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());

    let (mut service, events) = LanPeerService::new(svc_cfg, log_sink);
    if let Err(e) = service.start(&username) {
        eprintln!("[lanpeer] cannot start: {e}");
        drop(service);
        logger.shutdown();
        process::exit(3);
    }
    println!(
        "[lanpeer] {} online, ws port {}, number {}",
        username,
        service.ws_port().unwrap_or_default(),
        service.dialable_number().unwrap_or_default()
    );

    let printer = thread::Builder::new()
        .name("event-printer".into())
        .spawn(move || print_events(&events))
        .ok();

    let mut calls: HashMap<String, String> = HashMap::new();
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let result = match cmd {
            "" => Ok(()),
            "/quit" => break,
            "/msg" => match rest.split_once(' ') {
                Some((peer, text)) => service.send_message(peer, text.trim()),
                None => {
                    eprintln!("usage: /msg PEER TEXT");
                    Ok(())
                }
            },
            "/status" => service.set_status(rest),
            "/peers" => service.request_contacts(),
            "/call" if !rest.is_empty() => {
                let call_id = uuid::Uuid::new_v4().to_string();
                calls.insert(rest.to_owned(), call_id.clone());
                service.send_call_offer(rest, &call_id)
            }
            "/hangup" => match calls.remove(rest) {
                Some(call_id) => service.send_call_end(rest, &call_id),
                None => {
                    eprintln!("no call with {rest}");
                    Ok(())
                }
            },
            _ => {
                eprintln!("unknown command: {line}");
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!("[lanpeer] {e}");
        }
    }

    service.stop();
    drop(service);
    if let Some(h) = printer {
        let _ = h.join();
    }
    logger.shutdown();
}

fn print_events(events: &Receiver<PeerEvent>) {
    while let Ok(ev) = events.recv() {
        match ev {
            PeerEvent::Connected => println!("* connected"),
            PeerEvent::Disconnected => println!("* disconnected"),
            PeerEvent::ContactList(list) => {
                println!("* {} peer(s)", list.len());
                for c in list {
                    println!("    {:<16} {:<10} {}", c.username, c.status, c.dialable_number);
                }
            }
            PeerEvent::ContactAdded { peer } => println!("* contact added: {peer}"),
            PeerEvent::PresenceChanged { peer, status } => println!("* {peer} is {status}"),
            PeerEvent::MessageReceived { from, text, .. } => println!("<{from}> {text}"),
            PeerEvent::MessageAcknowledged { from, .. } => println!("  (delivered to {from})"),
            PeerEvent::Typing { from } => println!("  {from} is typing..."),
            PeerEvent::FileOffer {
                from,
                file_name,
                file_size,
            } => println!("* {from} offers {file_name} ({file_size} bytes)"),
            PeerEvent::FileData {
                from,
                file_name,
                data,
            } => println!("* received {file_name} from {from} ({} bytes)", data.len()),
            PeerEvent::CallOffer { from, call_id } => println!("* incoming call from {from} ({call_id})"),
            PeerEvent::CallAccepted { from, .. } => println!("* {from} accepted the call"),
            PeerEvent::CallRejected { from, .. } => println!("* {from} rejected the call"),
            PeerEvent::CallEnded { from, .. } => println!("* {from} hung up"),
            PeerEvent::ConnectionLost { peer } => println!("* connection to {peer} lost"),
            PeerEvent::PeerUnreachable { peer } => println!("* {peer} is not reachable"),
            other => println!("* {other:?}"),
        }
    }
}
