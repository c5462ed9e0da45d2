use std::{io::Cursor, str::FromStr, sync::Arc, time::Duration};

use rust_decimal::Decimal;
use tokio::{sync::watch, time::timeout};
use xhoundpi::{
    client::TransportClient,
    geo::{EulerAngles, GeoCoordinates},
    offset::{
        ConversionOffsetProvider, DistAngleFactorProvider, InverseFactorProvider, OffsetProvider,
        OrientationOffsetProvider, StaticOffsetProvider, StaticOrientationProvider,
    },
    operator::OffsetOperatorProvider,
    policy::{ConstPolicyProvider, HasLocation},
    processor::{GenericProcessor, Processor},
    runner::GnssPipeline,
    serial::{SharedBuffer, StubTransport, Transport},
    service::StandardGnssService,
    ubx::UbxMessage,
};

const GSV: &[u8] = b"$GPGSV,3,1,10,03,26,248,42,04,48,306,17,16,68,221,41,26,72,052,18,1*61\r\n";
const GGA: &[u8] =
    b"$GNGGA,221515.00,4238.96342,N,07118.97943,W,2,12,1.04,36.7,M,-33.0,M,,0131*41\r\n";
const BAD_GLL: &[u8] = b"$GNGLL,4238.96342,N,07118.97943,W,221515.00,A,D*00\r\n";

const NAV_POSECEF: [u8; 28] = [
    0xB5, 0x62, 0x01, 0x01, 0x14, 0x00, 0x40, 0x9E, 0x9F, 0x1D, 0x85, 0xD0, 0xB8, 0x08, 0xB4,
    0xA5, 0x81, 0xE6, 0x35, 0x71, 0x9B, 0x19, 0xFE, 0x05, 0x00, 0x00, 0xE2, 0x40,
];

const NAV_PVT: [u8; 100] = [
    0xB5, 0x62, 0x01, 0x07, 0x5C, 0x00, 0x40, 0x9E, 0x9F, 0x1D, 0xE8, 0x07, 0x0A, 0x03, 0x16,
    0x0F, 0x0F, 0x37, 0x19, 0x00, 0x00, 0x00, 0xC0, 0x1D, 0xFE, 0xFF, 0x03, 0x01, 0xEA, 0x0C,
    0x84, 0x6C, 0x97, 0xD5, 0xCF, 0xC7, 0x6B, 0x19, 0x2C, 0x4C, 0x00, 0x00, 0x14, 0xCD, 0x00,
    0x00, 0x4C, 0x04, 0x00, 0x00, 0xDC, 0x05, 0x00, 0x00, 0x0C, 0x00, 0x00, 0x00, 0xF9, 0xFF,
    0xFF, 0xFF, 0x03, 0x00, 0x00, 0x00, 0x0E, 0x00, 0x00, 0x00, 0x87, 0xD6, 0x12, 0x00, 0xEA,
    0x00, 0x00, 0x00, 0x40, 0x9C, 0x00, 0x00, 0x78, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x12, 0xEA,
];

const NAV_HPPOSLLH: [u8; 44] = [
    0xB5, 0x62, 0x01, 0x14, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB0, 0x19, 0xB9, 0x1D, 0xA5,
    0x4D, 0xE3, 0xCE, 0x34, 0x07, 0xAB, 0x11, 0x42, 0x4D, 0x00, 0x00, 0xA8, 0xC3, 0x00, 0x00,
    0xE5, 0x18, 0xFB, 0x03, 0xB2, 0x9A, 0x01, 0x00, 0x35, 0x72, 0x02, 0x00, 0x5D, 0xEC,
];

const ACK_ACK: [u8; 10] = [0xB5, 0x62, 0x05, 0x01, 0x02, 0x00, 0x06, 0x8A, 0x98, 0xC1];
const ACK_NAK: [u8; 10] = [0xB5, 0x62, 0x05, 0x00, 0x02, 0x00, 0x06, 0x8A, 0x97, 0xBC];
/// ACK-ACK declaring a one byte payload
const SHORT_ACK: [u8; 10] = [0xB5, 0x62, 0x05, 0x01, 0x01, 0x00, 0x06, 0x8A, 0x98, 0xC1];

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn static_offset(offset: GeoCoordinates) -> Arc<dyn OffsetProvider> {
    Arc::new(StaticOffsetProvider(offset))
}

/// Antenna mount offset converted to degrees at `reference`, wired like the daemon does
fn mount_offset(
    angles: EulerAngles,
    radius: Decimal,
    reference: GeoCoordinates,
) -> Arc<dyn OffsetProvider> {
    Arc::new(ConversionOffsetProvider::new(
        OrientationOffsetProvider::new(StaticOrientationProvider(angles), radius),
        InverseFactorProvider(DistAngleFactorProvider::new(reference).unwrap()),
    ))
}

fn offset_processor(offset: Arc<dyn OffsetProvider>) -> Arc<dyn Processor> {
    Arc::new(GenericProcessor::new(
        "CoordinateOffset",
        ConstPolicyProvider::new(HasLocation::default()),
        OffsetOperatorProvider::new(offset),
    ))
}

/// Run the pipeline over `transport` until `written` reports at least
/// `expected` bytes, then shut it down
async fn run_until<T, F>(
    transport: T,
    offset: Arc<dyn OffsetProvider>,
    expected: usize,
    written: F,
) where
    T: Transport + 'static,
    F: Fn() -> usize,
{
    let service = Arc::new(StandardGnssService::with_defaults(TransportClient::new(
        transport,
    )));
    let pipeline = GnssPipeline::new(service, offset_processor(offset), 16);
    let (stop, shutdown) = watch::channel(false);
    let task = tokio::spawn(async move { pipeline.run(shutdown).await });
    timeout(Duration::from_secs(5), async {
        while written() < expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pipeline produced too little output");
    stop.send(true).unwrap();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("pipeline did not stop")
        .unwrap()
        .unwrap();
}

async fn process(input: Vec<u8>, offset: Arc<dyn OffsetProvider>, expected: usize) -> Vec<u8> {
    let sink = SharedBuffer::new();
    let transport = StubTransport::new(Cursor::new(input), sink.clone()).unwrap();
    let observer = sink.clone();
    run_until(transport, offset, expected, move || observer.contents().len()).await;
    sink.contents()[..expected].to_vec()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mixed_stream_round_trips_with_zero_offset() {
    let input = [GSV, &NAV_POSECEF[..], &NAV_PVT[..], GGA].concat();
    let offset = static_offset(GeoCoordinates::default());
    let output = process(input.clone(), offset, input.len()).await;
    assert_eq!(output, input);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corrupt_frames_are_skipped() {
    let input = [BAD_GLL, &ACK_ACK[..], &SHORT_ACK[..], &ACK_NAK[..]].concat();
    let expected = [&ACK_ACK[..], &ACK_NAK[..]].concat();
    let output = process(input, static_offset(GeoCoordinates::default()), expected.len()).await;
    assert_eq!(output, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_offset_keeps_high_precision_frame() {
    let output = process(
        NAV_HPPOSLLH.to_vec(),
        static_offset(GeoCoordinates::default()),
        NAV_HPPOSLLH.len(),
    )
    .await;
    assert_eq!(output, NAV_HPPOSLLH.to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn offset_is_applied_to_every_protocol() {
    let shifted_gga: &[u8] =
        b"$GNGGA,221515.00,4308.96342,N,07218.97943,W,2,12,1.04,37.95,M,-33.0,M,,0131*7A\r\n";
    let input = [GGA, &NAV_PVT[..]].concat();
    let offset = GeoCoordinates::new(dec("0.5"), dec("-1"), dec("1.25"));
    let output = process(
        input,
        static_offset(offset),
        shifted_gga.len() + NAV_PVT.len(),
    )
    .await;
    assert_eq!(&output[..shifted_gga.len()], shifted_gga);
    let pvt = UbxMessage::parse(&output[shifted_gga.len()..]).unwrap();
    assert_eq!(pvt.get("lat"), Some(431493903));
    assert_eq!(pvt.get("lon"), Some(-721496572));
    assert_eq!(pvt.get("height"), Some(20750));
    assert_eq!(pvt.get("hMSL"), Some(53750));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn level_mount_raises_altitude_only() {
    let lifted: &[u8] =
        b"$GNGGA,221515.00,4238.96342,N,07118.97943,W,2,12,1.04,38.7,M,-33.0,M,,0131*4F\r\n";
    let offset = mount_offset(
        EulerAngles::default(),
        dec("2"),
        GeoCoordinates::new(dec("42.6494"), dec("-71.3163"), Decimal::ZERO),
    );
    let output = process(GGA.to_vec(), offset, lifted.len()).await;
    assert_eq!(output, lifted.to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pitched_mount_moves_latitude() {
    let moved: &[u8] =
        b"$GNGGA,221515.00,4238.96882,N,07118.97943,W,2,12,1.04,36.7,M,-33.0,M,,0131*46\r\n";
    let angles = EulerAngles {
        yaw: Decimal::ZERO,
        pitch: dec("1.5707963267948966"),
        roll: Decimal::ZERO,
    };
    let offset = mount_offset(
        angles,
        dec("10"),
        GeoCoordinates::new(dec("42.6494"), dec("-71.3163"), Decimal::ZERO),
    );
    let output = process(GGA.to_vec(), offset, moved.len()).await;
    assert_eq!(output, moved.to_vec());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_backed_stub_replays_recording() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("gnss_mock_input.bin");
    let output_path = dir.path().join("gnss_mock_output.bin");
    let input = [&NAV_HPPOSLLH[..], GGA].concat();
    std::fs::write(&input_path, &input).unwrap();
    let transport = StubTransport::from_files(&input_path, &output_path).unwrap();
    let observed = output_path.clone();
    run_until(transport, static_offset(GeoCoordinates::default()), input.len(), move || {
        std::fs::metadata(&observed)
            .map(|m| m.len() as usize)
            .unwrap_or(0)
    })
    .await;
    let output = std::fs::read(&output_path).unwrap();
    assert_eq!(&output[..input.len()], &input[..]);
}
