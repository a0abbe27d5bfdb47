use std::sync::Arc;
use std::time::Duration;

use llmwarden_gateway::Config;
use llmwarden_gateway::config::parse_config;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running gateway process bound to loopback ports, for black-box tests.
///
/// Requests must be sent through this as an explicit HTTP proxy (absolute-form
/// request target), since the pipeline resolves the upstream host from the
/// request URI rather than from routing configuration.
pub struct TestGateway {
	pub listen_addr: std::net::SocketAddr,
	task: JoinHandle<()>,
}

impl TestGateway {
	pub async fn start(config_yaml: &str) -> anyhow::Result<Self> {
		let listen_addr = find_free_port().await?;
		let admin_addr = find_free_port().await?;
		let metrics_addr = find_free_port().await?;

		let mut config: Config = parse_config(config_yaml, None)?;
		config.listen_addr = listen_addr;
		config.admin_addr = admin_addr;
		config.metrics_addr = metrics_addr;

		let task = tokio::task::spawn(async move {
			let bound = llmwarden_gateway::app::run(Arc::new(config)).await.expect("gateway failed to start");
			// Tests drive shutdown by aborting this task directly, so the
			// returned `Bound` only needs to be kept alive, not awaited.
			std::future::pending::<()>().await;
			drop(bound);
		});

		wait_for_port(listen_addr).await?;
		Ok(TestGateway { listen_addr, task })
	}

	/// A `reqwest::Client` configured to route every request through this
	/// gateway as an HTTP proxy, so requests are sent in absolute form.
	pub fn proxy_client(&self) -> reqwest::Client {
		let proxy_url = format!("http://{}", self.listen_addr);
		reqwest::Client::builder()
			.proxy(reqwest::Proxy::http(proxy_url).expect("valid proxy url"))
			.build()
			.expect("client builds")
	}
}

impl Drop for TestGateway {
	fn drop(&mut self) {
		self.task.abort();
	}
}

async fn find_free_port() -> anyhow::Result<std::net::SocketAddr> {
	let listener = TcpListener::bind("127.0.0.1:0").await?;
	listener.local_addr().map_err(Into::into)
}

async fn wait_for_port(addr: std::net::SocketAddr) -> anyhow::Result<()> {
	let deadline = Duration::from_secs(10);
	let start = std::time::Instant::now();
	while start.elapsed() < deadline {
		if tokio::net::TcpStream::connect(addr).await.is_ok() {
			return Ok(());
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	Err(anyhow::anyhow!("timed out waiting for {addr} to accept connections"))
}
