use core::net::Ipv4Addr;
use embassy_executor::Spawner;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpListenEndpoint, Runner, Stack, StackResources, StaticConfigV4};
use embassy_time::{Duration, Timer};
use esp_hal::peripherals::{RADIO_CLK, RNG, TIMG0, WIFI};
use esp_hal::rng::Rng;
use esp_wifi::wifi::{
    AccessPointConfiguration, Configuration, WifiApDevice, WifiController, WifiDevice, WifiEvent,
    WifiState,
};
use esp_wifi::{init, EspWifiController};
use log::{debug, error, info, warn};
use parking_gate_rs::{http, SharedStatus};
use smoltcp::wire::Ipv4Cidr;

const SSID: &str = match option_env!("PARKING_AP_SSID") {
    Some(ssid) => ssid,
    None => "parking-gate",
};
const AP_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
const HTTP_PORT: u16 = 80;

macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

/// Brings up the access point and spawns the network and status responder tasks.
pub async fn wifi_init(
    spawner: Spawner,
    timg0: TIMG0,
    rng: RNG,
    radio_clk: RADIO_CLK,
    wifi: WIFI,
    shared: &'static SharedStatus,
) {
    esp_alloc::heap_allocator!(72 * 1024);

    let timer_group0 = esp_hal::timer::timg::TimerGroup::new(timg0);
    let mut rng = Rng::new(rng);

    let esp_wifi_ctrl = match init(timer_group0.timer0, rng, radio_clk) {
        Ok(ctrl) => &*mk_static!(EspWifiController<'static>, ctrl),
        Err(err) => {
            error!("Error initializing wifi: {err:?}");
            return;
        }
    };

    let (wifi_ap_device, controller) =
        match esp_wifi::wifi::new_with_mode(esp_wifi_ctrl, wifi, WifiApDevice) {
            Ok(pair) => pair,
            Err(err) => {
                error!("Error creating access point: {err:?}");
                return;
            }
        };

    let ap_config = embassy_net::Config::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(AP_ADDR, 24),
        gateway: Some(AP_ADDR),
        dns_servers: Default::default(),
    });

    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (ap_stack, ap_runner) = embassy_net::new(
        wifi_ap_device,
        ap_config,
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        seed,
    );

    spawner.spawn(connection(controller)).ok();
    spawner.spawn(net_task(ap_runner)).ok();

    loop {
        if ap_stack.is_link_up() {
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }

    info!("Connect to the ap '{SSID}' and open http://{AP_ADDR}/status");

    spawner.spawn(http_task(ap_stack, shared)).ok();
}

#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>) {
    info!("start connection task");
    info!("Device capabilities: {:?}", controller.capabilities());

    loop {
        if matches!(esp_wifi::wifi::ap_state(), WifiState::ApStarted) {
            // wait until the ap goes down, then restart it
            controller.wait_for_event(WifiEvent::ApStop).await;
            Timer::after(Duration::from_millis(5000)).await
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let ap_config = Configuration::AccessPoint(AccessPointConfiguration {
                ssid: SSID.try_into().unwrap_or_default(),
                ..Default::default()
            });
            if let Err(e) = controller.set_configuration(&ap_config) {
                error!("Failed to configure ap: {e:?}");
                Timer::after(Duration::from_millis(5000)).await;
                continue;
            }
            info!("Starting wifi");
            match controller.start_async().await {
                Ok(()) => info!("Wifi started!"),
                Err(e) => {
                    error!("Failed to start wifi: {e:?}");
                    Timer::after(Duration::from_millis(5000)).await
                }
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static, WifiApDevice>>) {
    runner.run().await
}

/// Serves one request per connection on port 80.
#[embassy_executor::task]
async fn http_task(stack: Stack<'static>, shared: &'static SharedStatus) {
    let mut rx_buffer = [0; 1536];
    let mut tx_buffer = [0; 1536];
    let mut request = [0u8; 512];

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(10)));

        if let Err(e) = socket
            .accept(IpListenEndpoint {
                addr: None,
                port: HTTP_PORT,
            })
            .await
        {
            error!("accept error: {:?}", e);
            continue;
        }
        debug!("Client Connected...");

        let len = match socket.read(&mut request).await {
            Ok(0) => {
                debug!("Client Disconnected...");
                continue;
            }
            Ok(len) => len,
            Err(e) => {
                warn!("read error: {:?}", e);
                continue;
            }
        };

        let response = match http::respond(&request[..len], shared) {
            Ok(response) => response,
            Err(_) => {
                error!("response did not fit the buffer");
                socket.abort();
                continue;
            }
        };

        let mut sent = response.as_bytes();
        while !sent.is_empty() {
            match socket.write(sent).await {
                Ok(0) | Err(_) => {
                    info!("Client Disconnected...");
                    break;
                }
                Ok(n) => sent = &sent[n..],
            }
        }

        if let Err(e) = socket.flush().await {
            debug!("flush error: {:?}", e);
        }
        socket.close();
        Timer::after(Duration::from_millis(50)).await;
        socket.abort();
    }
}
