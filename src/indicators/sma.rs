use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;

use crate::types::PriceSeries;

/// Streaming simple moving average over a fixed window.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    period: usize,
    window: VecDeque<Decimal>,
    sum: Decimal,
}

impl MovingAverage {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: Decimal::ZERO,
        }
    }

    pub fn update(&mut self, price: Decimal) -> Option<Decimal> {
        if self.period == 0 {
            return None;
        }

        self.window.push_back(price);
        self.sum += price;
        if self.window.len() > self.period {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }

        self.value()
    }

    pub fn value(&self) -> Option<Decimal> {
        if self.period > 0 && self.window.len() == self.period {
            Some(self.sum / Decimal::from(self.period as u32))
        } else {
            None
        }
    }
}

/// Rolling mean aligned 1:1 with the input, `None` until the window fills.
pub fn rolling_mean(prices: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut ma = MovingAverage::new(period);
    prices.iter().map(|p| ma.update(*p)).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct MovingAveragePoint {
    pub date: NaiveDate,
    pub close: Decimal,
    pub average: Option<Decimal>,
}

/// Closing price next to its `days`-day moving average.
#[derive(Debug, Clone, Serialize)]
pub struct MovingAverageSeries {
    pub days: usize,
    pub points: Vec<MovingAveragePoint>,
}

impl MovingAverageSeries {
    pub fn compute(series: &PriceSeries, days: usize) -> Self {
        let averages = rolling_mean(&series.closes_decimal(), days);
        let points = series
            .records()
            .iter()
            .zip(averages)
            .map(|(record, average)| MovingAveragePoint {
                date: record.date,
                close: record.close,
                average,
            })
            .collect();

        Self { days, points }
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.points.last().and_then(|p| p.average)
    }
}

pub fn moving_averages(series: &PriceSeries, windows: &[usize]) -> Vec<MovingAverageSeries> {
    windows
        .iter()
        .map(|&days| MovingAverageSeries::compute(series, days))
        .collect()
}
