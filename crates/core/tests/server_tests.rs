//! End-to-end tests over localhost TCP: a real listener, real control
//! and data connections, a temp-dir filesystem.

use std::net::SocketAddr;
use std::sync::Arc;

use skiff_core::config::{FtpConfig, UserEntry};
use skiff_core::{FtpListener, FtpState, LocalFileSystem, StaticUserStore};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

struct TestServer {
    addr: SocketAddr,
    state: Arc<FtpState>,
    _dir: tempfile::TempDir,
}

async fn start_server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"hello from skiff").unwrap();
    std::fs::create_dir(dir.path().join("pub")).unwrap();

    let config = FtpConfig {
        hostname: "127.0.0.1".to_string(),
        port: 0,
        timeout_secs: 30,
        guest: true,
        homedir: dir.path().to_path_buf(),
        external_ip: None,
        pasv_ports: vec![0, 0, 0],
        workers: 4,
        owner: "ftp".to_string(),
        users: vec![UserEntry {
            name: "alice".to_string(),
            password: "secret".to_string(),
            home: None,
        }],
    };

    let filesystem = Arc::new(LocalFileSystem::new(dir.path(), "ftp"));
    let users = Arc::new(StaticUserStore::new(&config.users));
    let state = FtpState::new(config, filesystem, users);

    let listener = FtpListener::bind(state.clone()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());

    TestServer {
        addr,
        state,
        _dir: dir,
    }
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Read one (possibly multi-line) reply, returning the code and the
    /// first line's text
    async fn read_reply(&mut self) -> (u16, String) {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        assert!(line.len() >= 4, "short reply line: {:?}", line);

        let code: u16 = line[..3].parse().unwrap();
        let text = line[4..].trim_end().to_string();
        if line.as_bytes()[3] == b'-' {
            let terminator = format!("{} ", code);
            loop {
                let mut next = String::new();
                self.reader.read_line(&mut next).await.unwrap();
                if next.starts_with(&terminator) {
                    break;
                }
            }
        }
        (code, text)
    }

    async fn cmd(&mut self, line: &str) -> (u16, String) {
        self.send(line).await;
        self.read_reply().await
    }

    async fn login_guest(&mut self) {
        let (code, _) = self.read_reply().await;
        assert_eq!(code, 220);
        let (code, _) = self.cmd("USER anonymous").await;
        assert_eq!(code, 331);
        let (code, text) = self.cmd("PASS me@example.com").await;
        assert_eq!(code, 230);
        assert_eq!(text, "User logged in, proceed.");
    }

    /// Enter passive mode and open the data connection like a real
    /// client: connect right after the 227
    async fn open_passive(&mut self) -> TcpStream {
        let (code, text) = self.cmd("PASV").await;
        assert_eq!(code, 227, "{}", text);
        let port = parse_pasv_port(&text);
        TcpStream::connect(("127.0.0.1", port)).await.unwrap()
    }
}

fn parse_pasv_port(text: &str) -> u16 {
    let inner = text
        .rsplit('(')
        .next()
        .and_then(|t| t.split(')').next())
        .unwrap();
    let fields: Vec<u16> = inner.split(',').map(|p| p.parse().unwrap()).collect();
    assert_eq!(fields.len(), 6, "bad PASV reply: {}", text);
    fields[4] * 256 + fields[5]
}

#[tokio::test]
async fn test_s1_guest_login() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;

    let (code, _) = client.read_reply().await;
    assert_eq!(code, 220);
    let (code, text) = client.cmd("USER anonymous").await;
    assert_eq!(code, 331);
    assert!(text.contains("email"), "{}", text);
    let (code, text) = client.cmd("PASS me@example.com").await;
    assert_eq!(code, 230);
    assert_eq!(text, "User logged in, proceed.");
}

#[tokio::test]
async fn test_configured_user_login() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;

    let (code, _) = client.read_reply().await;
    assert_eq!(code, 220);
    let (code, _) = client.cmd("USER alice").await;
    assert_eq!(code, 331);
    let (code, _) = client.cmd("PASS wrong").await;
    assert_eq!(code, 530);
    let (code, _) = client.cmd("USER alice").await;
    assert_eq!(code, 331);
    let (code, _) = client.cmd("PASS secret").await;
    assert_eq!(code, 230);
}

#[tokio::test]
async fn test_s2_pwd_quoting() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("PWD").await;
    assert_eq!(code, 257);
    assert_eq!(text, "\"/\" is current directory.");
}

#[tokio::test]
async fn test_s3_pasv_retr() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("TYPE I").await;
    assert_eq!(code, 200);
    assert_eq!(text, "Type set to I");

    let mut data = client.open_passive().await;
    let (code, _) = client.cmd("RETR hello.txt").await;
    assert_eq!(code, 150);

    let mut payload = Vec::new();
    data.read_to_end(&mut payload).await.unwrap();
    assert_eq!(payload, b"hello from skiff");

    let (code, text) = client.read_reply().await;
    assert_eq!(code, 226);
    assert_eq!(text, "Transfer completed for \"hello.txt\".");
}

#[tokio::test]
async fn test_s4_port_stor() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    // The client listens; the server dials out on transfer start
    let data_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let data_port = data_listener.local_addr().unwrap().port();
    let feeder = tokio::spawn(async move {
        let (mut stream, _) = data_listener.accept().await.unwrap();
        stream.write_all(b"uploaded via PORT").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let port_param = format!("127,0,0,1,{},{}", data_port / 256, data_port % 256);
    let (code, text) = client.cmd(&format!("PORT {}", port_param)).await;
    assert_eq!(code, 200);
    assert_eq!(text, "PORT command successful.");

    let (code, _) = client.cmd("STOR out.bin").await;
    assert_eq!(code, 150);
    let (code, text) = client.read_reply().await;
    assert_eq!(code, 226);
    assert_eq!(text, "Transfer completed for \"out.bin\".");
    feeder.await.unwrap();

    let stored = std::fs::read(server._dir.path().join("out.bin")).unwrap();
    assert_eq!(stored, b"uploaded via PORT");
}

#[tokio::test]
async fn test_s5_abor_mid_transfer() {
    let server = start_server().await;
    // Big enough that the pump stalls on socket backpressure while the
    // client refuses to read
    let big = vec![0x5au8; 8 * 1024 * 1024];
    std::fs::write(server._dir.path().join("big.bin"), &big).unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let _data = client.open_passive().await;
    let (code, _) = client.cmd("RETR big.bin").await;
    assert_eq!(code, 150);

    let (code, text) = client.cmd("ABOR").await;
    assert_eq!(code, 426);
    assert_eq!(text, "Connection closed, transfer aborted.");
    let (code, text) = client.read_reply().await;
    assert_eq!(code, 226);
    assert_eq!(text, "Abort command successful.");

    // The session is usable again
    let (code, _) = client.cmd("PWD").await;
    assert_eq!(code, 257);
}

#[tokio::test]
async fn test_s6_unknown_command() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("FOO bar").await;
    assert_eq!(code, 504);
    assert_eq!(text, "Not implemented.");
}

#[tokio::test]
async fn test_s7_rest_rejected_for_ascii_type() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("TYPE A").await;
    assert_eq!(code, 200);
    assert_eq!(text, "Type set to A");

    let (code, text) = client.cmd("REST 100").await;
    assert_eq!(code, 550);
    assert_eq!(text, "REST unavailable for TYPE A, MODE S, STRU F.");
}

#[tokio::test]
async fn test_s8_suspended_server() {
    let server = start_server().await;
    server.state.set_suspended(true);

    let mut client = Client::connect(server.addr).await;
    let (code, text) = client.read_reply().await;
    assert_eq!(code, 421);
    assert_eq!(text, "Service not available, closing control connection.");

    // The connection is closed right after
    let mut rest = String::new();
    client.reader.read_to_string(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_stor_retr_round_trip_and_counters() {
    let server = start_server().await;
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;
    let (code, _) = client.cmd("TYPE I").await;
    assert_eq!(code, 200);

    let mut data = client.open_passive().await;
    let (code, _) = client.cmd("STOR blob.bin").await;
    assert_eq!(code, 150);
    data.write_all(&payload).await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 226);

    let mut data = client.open_passive().await;
    let (code, _) = client.cmd("RETR blob.bin").await;
    assert_eq!(code, 150);
    let mut echoed = Vec::new();
    data.read_to_end(&mut echoed).await.unwrap();
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 226);

    assert_eq!(echoed, payload);
    assert_eq!(server.state.registry.uploaded(), payload.len() as u64);
    assert_eq!(server.state.registry.downloaded(), payload.len() as u64);
}

#[tokio::test]
async fn test_rest_resumes_at_offset() {
    let server = start_server().await;
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
    std::fs::write(server._dir.path().join("resume.bin"), &payload).unwrap();

    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("REST 137").await;
    assert_eq!(code, 350, "{}", text);

    let mut data = client.open_passive().await;
    let (code, _) = client.cmd("RETR resume.bin").await;
    assert_eq!(code, 150);
    let mut tail = Vec::new();
    data.read_to_end(&mut tail).await.unwrap();
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 226);

    assert_eq!(tail.len(), payload.len() - 137);
    assert_eq!(tail, payload[137..]);

    // The marker is one-shot: the next RETR starts from zero
    let mut data = client.open_passive().await;
    let (code, _) = client.cmd("RETR resume.bin").await;
    assert_eq!(code, 150);
    let mut full = Vec::new();
    data.read_to_end(&mut full).await.unwrap();
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 226);
    assert_eq!(full, payload);
}

#[tokio::test]
async fn test_list_and_mlsd_over_data_connection() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let mut data = client.open_passive().await;
    let (code, _) = client.cmd("LIST").await;
    assert_eq!(code, 150);
    let mut listing = String::new();
    data.read_to_string(&mut listing).await.unwrap();
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 226);
    assert!(listing.contains("hello.txt"), "{}", listing);
    assert!(listing.contains("drwx"), "{}", listing);

    let mut data = client.open_passive().await;
    let (code, _) = client.cmd("MLSD").await;
    assert_eq!(code, 150);
    let mut facts = String::new();
    data.read_to_string(&mut facts).await.unwrap();
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 226);
    assert!(facts.starts_with("type=cdir"), "{}", facts);
    assert!(facts.contains("type=pdir"), "{}", facts);
    assert!(facts.contains("hello.txt"), "{}", facts);
}

#[tokio::test]
async fn test_epsv_and_nlst() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("EPSV").await;
    assert_eq!(code, 229);
    let port: u16 = text
        .split("|||")
        .nth(1)
        .and_then(|t| t.split('|').next())
        .unwrap()
        .parse()
        .unwrap();
    let mut data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let (code, _) = client.cmd("NLST").await;
    assert_eq!(code, 150);
    let mut names = String::new();
    data.read_to_string(&mut names).await.unwrap();
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 226);
    assert!(names.contains("hello.txt\r\n"), "{}", names);
    assert!(names.contains("pub/\r\n"), "{}", names);
}

#[tokio::test]
async fn test_transfer_without_opener_is_425() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("RETR hello.txt").await;
    assert_eq!(code, 425);
    assert_eq!(text, "Use PORT or PASV first.");
}

#[tokio::test]
async fn test_file_management_cycle() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("MKD inbox").await;
    assert_eq!(code, 257);
    assert_eq!(text, "\"/inbox\" directory created.");

    let (code, _) = client.cmd("CWD inbox").await;
    assert_eq!(code, 250);
    let (code, text) = client.cmd("PWD").await;
    assert_eq!(code, 257);
    assert_eq!(text, "\"/inbox\" is current directory.");

    let (code, _) = client.cmd("CDUP").await;
    assert_eq!(code, 250);

    let (code, _) = client.cmd("RNFR hello.txt").await;
    assert_eq!(code, 350);
    let (code, _) = client.cmd("RNTO inbox/renamed.txt").await;
    assert_eq!(code, 250);
    assert!(server._dir.path().join("inbox/renamed.txt").exists());

    let (code, _) = client.cmd("DELE inbox/renamed.txt").await;
    assert_eq!(code, 250);
    assert!(!server._dir.path().join("inbox/renamed.txt").exists());

    let (code, _) = client.cmd("RNTO orphan.txt").await;
    assert_eq!(code, 503);
}

#[tokio::test]
async fn test_size_and_mdtm() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("SIZE hello.txt").await;
    assert_eq!(code, 213);
    assert_eq!(text, "16");

    let (code, text) = client.cmd("MDTM hello.txt").await;
    assert_eq!(code, 213);
    assert_eq!(text.len(), 14);
    assert!(text.chars().all(|c| c.is_ascii_digit()));

    // Directories have neither a size nor a modification time reply
    let (code, _) = client.cmd("SIZE pub").await;
    assert_eq!(code, 550);

    // SIZE is refused while the ASCII filter could change the length
    let (code, _) = client.cmd("TYPE A").await;
    assert_eq!(code, 200);
    let (code, _) = client.cmd("SIZE hello.txt").await;
    assert_eq!(code, 550);
}

#[tokio::test]
async fn test_stat_and_mlst_on_control_channel() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("STAT").await;
    assert_eq!(code, 211);
    assert!(text.contains("TYPE I"), "{}", text);

    let (code, _) = client.cmd("STAT hello.txt").await;
    assert_eq!(code, 212);

    let (code, text) = client.cmd("MLST hello.txt").await;
    assert_eq!(code, 250);
    assert!(text.contains("Listing"), "{}", text);
}

#[tokio::test]
async fn test_idle_control_connection_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = FtpConfig {
        hostname: "127.0.0.1".to_string(),
        port: 0,
        timeout_secs: 1,
        homedir: dir.path().to_path_buf(),
        ..FtpConfig::default()
    };
    let filesystem = Arc::new(LocalFileSystem::new(dir.path(), "ftp"));
    let state = FtpState::new(config, filesystem, Arc::new(StaticUserStore::empty()));
    let listener = FtpListener::bind(state).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run());

    let mut client = Client::connect(addr).await;
    let (code, _) = client.read_reply().await;
    assert_eq!(code, 220);

    // Say nothing; the deadline reaper should answer 421 and close
    let reply = tokio::time::timeout(std::time::Duration::from_secs(5), client.read_reply())
        .await
        .expect("server never timed the session out");
    assert_eq!(reply.0, 421);
    assert_eq!(reply.1, "Service timeout, closing control connection.");
}

#[tokio::test]
async fn test_quit_poisons_session() {
    let server = start_server().await;
    let mut client = Client::connect(server.addr).await;
    client.login_guest().await;

    let (code, text) = client.cmd("QUIT").await;
    assert_eq!(code, 221);
    assert_eq!(text, "Goodbye.");

    let mut rest = String::new();
    client.reader.read_to_string(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}
