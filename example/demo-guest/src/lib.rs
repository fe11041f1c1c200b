#![cfg_attr(target_arch = "wasm32", no_std)]

// Demo guest for framepump.
//
// Build with `cargo build -p demo_guest --target wasm32-unknown-unknown --release` and load the
// resulting `.wasm` into `framepump` or any libretro frontend running `framepump-core`.
//
// The host calls:
// - `wasm_get_width()` / `wasm_get_height()` once at startup.
// - `wasm_compute_frame(index, elapsed_ms)` once per refresh; the returned pointer must address
//   `WIDTH * HEIGHT` RGBA pixels.

use core::slice;

const WIDTH: usize = 320;
const HEIGHT: usize = 240;

// Little-endian 0xAABBGGRR, so bytes land in memory as R, G, B, A.
const BLACK: u32 = 0xFF00_0000;
const RED: u32 = 0xFF20_20FF;
const TEAL: u32 = 0xFFB0_A020;
const WHITE: u32 = 0xFFFF_FFFF;

static mut FRAME: [u32; WIDTH * HEIGHT] = [0; WIDTH * HEIGHT];
static mut ORBIT_MS: f64 = 0.0;

unsafe extern "C" {
    fn system_log(ptr: *const u8, len: usize);
}

fn log(msg: &str) {
    unsafe { system_log(msg.as_ptr(), msg.len()) }
}

fn frame() -> &'static mut [u32] {
    unsafe { slice::from_raw_parts_mut((&raw mut FRAME).cast::<u32>(), WIDTH * HEIGHT) }
}

fn put_pixel(pixels: &mut [u32], x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 || x >= WIDTH as i32 || y >= HEIGHT as i32 {
        return;
    }
    pixels[y as usize * WIDTH + x as usize] = color;
}

fn fill_rect(pixels: &mut [u32], x: i32, y: i32, w: i32, h: i32, color: u32) {
    for py in y..y + h {
        for px in x..x + w {
            put_pixel(pixels, px, py, color);
        }
    }
}

fn circle(pixels: &mut [u32], cx: i32, cy: i32, r: i32, color: u32, filled: bool) {
    let r2 = r * r;
    let inner = (r - 1) * (r - 1);
    for dy in -r..=r {
        for dx in -r..=r {
            let d = dx * dx + dy * dy;
            if d <= r2 && (filled || d >= inner) {
                put_pixel(pixels, cx + dx, cy + dy, color);
            }
        }
    }
}

// Bresenham.
fn line(pixels: &mut [u32], mut x0: i32, mut y0: i32, x1: i32, y1: i32, color: u32) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put_pixel(pixels, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

// Triangle wave in [0, 1); avoids pulling in libm for sin/cos.
fn tri(t: f64) -> f64 {
    let f = t - (t as i64) as f64;
    if f < 0.5 { f * 2.0 } else { 2.0 - f * 2.0 }
}

#[unsafe(no_mangle)]
pub extern "C" fn wasm_get_width() -> u32 {
    WIDTH as u32
}

#[unsafe(no_mangle)]
pub extern "C" fn wasm_get_height() -> u32 {
    HEIGHT as u32
}

#[unsafe(no_mangle)]
pub extern "C" fn wasm_compute_frame(index: u32, elapsed_ms: f64) -> *const u32 {
    if index == 0 {
        log("demo guest: first frame");
    }

    let orbit = unsafe {
        ORBIT_MS = if index == 0 { 0.0 } else { ORBIT_MS + elapsed_ms };
        ORBIT_MS
    };

    let pixels = frame();
    pixels.fill(BLACK);

    // Scrolling bands, one pixel per frame.
    let shift = (index as usize) % WIDTH;
    for x in (0..WIDTH).step_by(40) {
        let bx = ((x + shift) % WIDTH) as i32;
        fill_rect(pixels, bx, HEIGHT as i32 - 12, 20, 12, TEAL);
    }

    // Ball bouncing on elapsed time, independent of refresh rate.
    let bx = 20 + (tri(orbit / 4000.0) * (WIDTH as f64 - 40.0)) as i32;
    let by = 20 + (tri(orbit / 2600.0) * (HEIGHT as f64 - 60.0)) as i32;
    circle(pixels, bx, by, 14, RED, true);
    circle(pixels, bx, by, 18, WHITE, false);

    line(pixels, WIDTH as i32 / 2, 0, bx, by, WHITE);
    fill_rect(pixels, 8, 8, 60, 30, RED);

    pixels.as_ptr()
}

#[cfg(target_arch = "wasm32")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    core::arch::wasm32::unreachable()
}
