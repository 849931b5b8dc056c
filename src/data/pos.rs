use std::f64::consts::FRAC_PI_4;

/// Equatorial earth radius used for the Mercator projection, in metres.
const POS_EQ_RADIUS: f64 = 6378137.0;

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pos {
    pub lat: f64,
    pub lon: f64,
}

impl Pos {
    pub fn new(lat: f64, lon: f64) -> Self {
        Pos { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    fn to_mercator(self) -> (f64, f64) {
        let x = POS_EQ_RADIUS * self.lon.to_radians();
        let y = POS_EQ_RADIUS * (FRAC_PI_4 + self.lat.to_radians() / 2.0).tan().ln();
        (x, y)
    }
}

/// Projected position in metres relative to the centre of the map bounds.
/// `y` grows southwards, like screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LPos {
    pub x: i32,
    pub y: i32,
}

impl LPos {
    pub fn new(x: i32, y: i32) -> Self {
        LPos { x, y }
    }
}

/// Area covered by the downloaded data, plus the projection it defines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub ll_min: Pos,
    pub ll_max: Pos,
    center: (f64, f64),
    scale: f64,
    pub min: LPos,
    pub max: LPos,
}

impl Bounds {
    pub fn new(ll_min: Pos, ll_max: Pos) -> Option<Self> {
        if !ll_min.is_valid()
            || !ll_max.is_valid()
            || ll_min.lat > ll_max.lat
            || ll_min.lon > ll_max.lon
        {
            return None;
        }

        let center_pos = Pos::new(
            (ll_min.lat + ll_max.lat) / 2.0,
            (ll_min.lon + ll_max.lon) / 2.0,
        );
        // compensates for the stretching of the projection
        let scale = center_pos.lat.to_radians().cos();
        let mut bounds = Bounds {
            ll_min,
            ll_max,
            center: center_pos.to_mercator(),
            scale,
            min: LPos::default(),
            max: LPos::default(),
        };
        let corner_a = bounds.pos_to_lpos(&ll_min);
        let corner_b = bounds.pos_to_lpos(&ll_max);
        bounds.min = LPos::new(corner_a.x.min(corner_b.x), corner_a.y.min(corner_b.y));
        bounds.max = LPos::new(corner_a.x.max(corner_b.x), corner_a.y.max(corner_b.y));
        Some(bounds)
    }

    pub fn pos_to_lpos(&self, pos: &Pos) -> LPos {
        let (x, y) = pos.to_mercator();
        LPos {
            x: ((x - self.center.0) * self.scale).round() as i32,
            y: ((self.center.1 - y) * self.scale).round() as i32,
        }
    }

    pub fn lpos_to_pos(&self, lpos: &LPos) -> Pos {
        let x = f64::from(lpos.x) / self.scale + self.center.0;
        let y = self.center.1 - f64::from(lpos.y) / self.scale;
        Pos {
            lat: (2.0 * (y / POS_EQ_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
            lon: (x / POS_EQ_RADIUS).to_degrees(),
        }
    }

    pub fn contains(&self, pos: &Pos) -> bool {
        (self.ll_min.lat..=self.ll_max.lat).contains(&pos.lat)
            && (self.ll_min.lon..=self.ll_max.lon).contains(&pos.lon)
    }

    pub fn contains_lpos(&self, lpos: &LPos) -> bool {
        (self.min.x..=self.max.x).contains(&lpos.x) && (self.min.y..=self.max.y).contains(&lpos.y)
    }
}
