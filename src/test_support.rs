//! Synthetic order tables with planted rings, for tests and benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ColumnNames;
use crate::model::{Table, Value};
use crate::temporal::{format_instant, Instant};

const FAMILY: [&str; 6] = ["Nguyễn", "Trần", "Lê", "Phạm", "Hoàng", "Võ"];
const MIDDLE: [&str; 4] = ["Văn", "Thị", "Minh", "Ngọc"];
const GIVEN: [&str; 8] = ["An", "Bình", "Cường", "Dung", "Hà", "Khoa", "Lan", "Tú"];
const STREETS: [&str; 6] = [
    "Lê Lợi",
    "Hai Bà Trưng",
    "Nguyễn Huệ",
    "Trần Hưng Đạo",
    "Pasteur",
    "Điện Biên Phủ",
];

/// Start of the generated time range, 2024-01-01T00:00:00Z.
const EPOCH: Instant = 1_704_067_200;
const THIRTY_DAYS: Instant = 30 * 24 * 3600;

/// Buyers planted to share phone, promotion, checkout IP, address and order value
/// within a twenty-minute burst.
#[derive(Debug, Clone)]
pub struct PlantedRing {
    pub buyers: Vec<String>,
    pub phone: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedOrders {
    pub table: Table,
    pub rings: Vec<PlantedRing>,
}

/// Generate `count` background orders plus `ring_count` rings of `ring_size` buyers each.
///
/// Background buyers get unique phones, IPs and promotions and times spread over thirty
/// days, so the exact-key and temporal presets flag only the planted rings.
pub fn generate_orders(count: u32, ring_count: u32, ring_size: u32, seed: u64) -> GeneratedOrders {
    let columns = ColumnNames::default();
    let header = [
        columns.buyer_id.as_str(),
        columns.device_phone.as_str(),
        columns.recipient_phone.as_str(),
        columns.promotion.as_str(),
        columns.voucher.as_str(),
        columns.district.as_str(),
        columns.checkout_ip.as_str(),
        columns.create_time.as_str(),
        columns.registration_time.as_str(),
        columns.recipient_name.as_str(),
        columns.order_value.as_str(),
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity((count + ring_count * ring_size) as usize);

    for i in 0..count {
        let created = EPOCH + rng.random_range(0..THIRTY_DAYS);
        rows.push(vec![
            Value::text(format!("{}", 100_000 + i)),
            Value::text(format!("09{:08}", i)),
            Value::text(format!("08{:08}", i)),
            Value::text(format!("PROMO-{i}")),
            Value::text(format!("FSV-{i}")),
            Value::text(format!(
                "{} {}, Phường {}",
                rng.random_range(1..500),
                STREETS[rng.random_range(0..STREETS.len())],
                i
            )),
            Value::text(format!("10.{}.{}.{}", i >> 16, (i >> 8) & 0xff, i & 0xff)),
            Value::text(format_instant(created)),
            Value::text(format_instant(created - rng.random_range(0..THIRTY_DAYS))),
            Value::text(random_name(&mut rng)),
            Value::Number(f64::from(rng.random_range(10u32..5_000) * 1_000)),
        ]);
    }

    let mut rings = Vec::with_capacity(ring_count as usize);
    for r in 0..ring_count {
        let phone = format!("07{:08}", r);
        let start = EPOCH + rng.random_range(0..THIRTY_DAYS);
        let name = random_name(&mut rng);
        let address = format!("Số {} {}, Quận {}", r + 1, STREETS[r as usize % STREETS.len()], r);
        let value = f64::from(rng.random_range(10u32..5_000) * 1_000);
        let mut buyers = Vec::with_capacity(ring_size as usize);
        for m in 0..ring_size {
            let buyer = format!("R{r}-{m}");
            let created = start + rng.random_range(0..1_200);
            rows.push(vec![
                Value::text(buyer.clone()),
                Value::text(phone.clone()),
                Value::text(phone.clone()),
                Value::text(format!("RING-PROMO-{r}")),
                Value::text(format!("RING-FSV-{r}")),
                Value::text(address.clone()),
                Value::text(format!("172.16.0.{r}")),
                Value::text(format_instant(created)),
                Value::text(format_instant(start - 3_600 + rng.random_range(0..1_200))),
                Value::text(name.clone()),
                Value::Number(value),
            ]);
            buyers.push(buyer);
        }
        rings.push(PlantedRing { buyers, phone });
    }

    let table = match Table::with_rows(header, rows) {
        Ok(table) => table,
        Err(err) => unreachable!("generated rows match the header: {err}"),
    };
    GeneratedOrders { table, rings }
}

fn random_name(rng: &mut StdRng) -> String {
    format!(
        "{} {} {}",
        FAMILY[rng.random_range(0..FAMILY.len())],
        MIDDLE[rng.random_range(0..MIDDLE.len())],
        GIVEN[rng.random_range(0..GIVEN.len())]
    )
}
